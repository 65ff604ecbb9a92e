//! Application layer - Use case services.
//!
//! This module contains application services that orchestrate
//! domain logic and adapter interactions.
//!
//! Services are designed to be thin orchestrators that:
//! - Accept domain types as inputs
//! - Use ports (traits) for external dependencies
//! - Return domain types as outputs

mod finder;
mod killer;
mod terminator;

pub use finder::{ProcessFinder, PORT_POLL_INTERVAL};
pub use killer::{PortKill, ProcessKiller, EXIT_POLL_INTERVAL, FORCE_KILL_GRACE};
pub use terminator::PortTerminator;
