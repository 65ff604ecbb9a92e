//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`.
//! `platform` talks to the operating system through its native tools.

pub mod platform;

#[cfg(test)]
pub(crate) mod mock;

// Re-export main types for convenience
pub use platform::{PlatformKind, SystemAdapter};
