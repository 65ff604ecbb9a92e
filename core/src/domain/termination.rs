//! Per-port termination outcome.

use serde::{Deserialize, Serialize};

use super::ProcessInfo;
use crate::error::Error;

/// What happened to one port during an orchestrated termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationResult {
    /// The port that was targeted.
    pub port: u16,
    /// True when the port ended with no owning process.
    pub success: bool,
    /// Processes found on the port, in discovery order.
    pub processes: Vec<ProcessInfo>,
    /// Failure reason, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable code of the error behind `error`, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl TerminationResult {
    pub fn succeeded(port: u16, processes: Vec<ProcessInfo>) -> Self {
        Self {
            port,
            success: true,
            processes,
            error: None,
            error_code: None,
        }
    }

    pub fn failed(port: u16, processes: Vec<ProcessInfo>, reason: impl Into<String>) -> Self {
        Self {
            port,
            success: false,
            processes,
            error: Some(reason.into()),
            error_code: None,
        }
    }

    /// A failed result carrying the message and code of `error`.
    pub fn from_error(port: u16, processes: Vec<ProcessInfo>, error: &Error) -> Self {
        Self {
            error_code: Some(error.code().to_string()),
            ..Self::failed(port, processes, error.to_string())
        }
    }

    /// Whether this port failed because the OS refused the operation.
    pub fn is_permission_denied(&self) -> bool {
        self.error_code.as_deref() == Some("PERMISSION_DENIED")
    }
}
