//! PortTerminator Core Library
//!
//! Cross-platform library for finding and terminating the processes bound
//! to network ports. Provides functionality to:
//! - Find the processes owning a TCP and/or UDP port
//! - Terminate them gracefully, escalating to a forced kill
//! - Clear many ports at once with isolated per-port outcomes
//! - Persist default options
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models and validation
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: External system implementations
//! - `application`: Use case services
//!
//! # Platform Support
//! - Linux: `lsof`, falling back to `ss`
//! - macOS: `lsof`, falling back to `netstat`
//! - Windows: `netstat -ano` and `tasklist`, falling back to PowerShell
//!
//! # Example
//!
//! ```no_run
//! use portterminator_core::{Options, PortTerminator};
//!
//! # async fn example() -> portterminator_core::Result<()> {
//! let terminator = PortTerminator::system(Options::default())?;
//! if terminator.terminate(&[3000, 8080]).await {
//!     println!("Ports cleared");
//! }
//! # Ok(())
//! # }
//! ```

// Hexagonal architecture layers
pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub mod config;
pub mod error;

// Re-export domain types (primary API)
pub use domain::{
    parse_port_args, validate_pid, validate_port, validate_port_range, ProcessInfo, Protocol,
    ProtocolFilter, TerminationResult, DEFAULT_MAX_RANGE_SIZE,
};

// Re-export other commonly used types
pub use adapters::{PlatformKind, SystemAdapter};
pub use application::{PortKill, PortTerminator, ProcessFinder, ProcessKiller};
pub use config::{ConfigStore, Options};
pub use error::{Error, Result};
pub use ports::PlatformAdapter;
