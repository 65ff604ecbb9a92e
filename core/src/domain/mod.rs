//! Domain layer - Pure data models and validation.
//!
//! This module contains the types that flow between the finder, killer
//! and orchestrator. These types have no I/O dependencies and can be
//! tested in isolation.

mod process;
mod termination;
pub mod validation;

// Re-export all domain types
pub use process::{dedup_processes, ProcessInfo, Protocol, ProtocolFilter};
pub use termination::TerminationResult;
pub use validation::{
    parse_port_args, validate_pid, validate_port, validate_port_number, validate_port_range,
    DEFAULT_MAX_RANGE_SIZE,
};
