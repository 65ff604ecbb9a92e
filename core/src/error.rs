//! Error types for the portterminator-core library.

use thiserror::Error;

/// Result type alias for portterminator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while finding or terminating processes on ports.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested process does not exist (or no longer exists).
    #[error("Process not found{}", context(.pid, .port))]
    ProcessNotFound { pid: Option<u32>, port: Option<u16> },

    /// The OS refused the operation for the current user.
    #[error("Permission denied: {message}")]
    PermissionDenied {
        message: String,
        pid: Option<u32>,
        port: Option<u16>,
    },

    /// Platform not supported.
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),

    /// An operation did not complete before its deadline.
    #[error("Operation timed out after {timeout_ms}ms: {operation}")]
    OperationTimeout {
        operation: String,
        timeout_ms: u64,
        port: Option<u16>,
    },

    /// A port value failed validation.
    #[error("Invalid port '{value}': {reason}")]
    InvalidPort { value: String, reason: String },

    /// A PID outside the range that can be safely signalled.
    #[error("Invalid PID {0}: must be a positive integer no greater than {max}", max = i32::MAX)]
    InvalidPid(u32),

    /// Failed to execute a system command, or it reported failure.
    #[error("Command execution failed: {command}{}: {stderr}", exit_suffix(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Failed to kill a process.
    #[error("Failed to kill process {pid}: {reason}")]
    KillFailed {
        pid: u32,
        signal: Option<String>,
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ProcessNotFound { .. } => "PROCESS_NOT_FOUND",
            Error::PermissionDenied { .. } => "PERMISSION_DENIED",
            Error::UnsupportedPlatform(_) => "PLATFORM_UNSUPPORTED",
            Error::OperationTimeout { .. } => "OPERATION_TIMEOUT",
            Error::InvalidPort { .. } => "INVALID_PORT",
            Error::InvalidPid(_) => "INVALID_PID",
            Error::CommandFailed { .. } => "COMMAND_EXECUTION_FAILED",
            Error::KillFailed { .. } => "PROCESS_KILL_FAILED",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
        }
    }

    /// The port this error relates to, when known.
    pub fn port(&self) -> Option<u16> {
        match self {
            Error::ProcessNotFound { port, .. }
            | Error::PermissionDenied { port, .. }
            | Error::OperationTimeout { port, .. } => *port,
            _ => None,
        }
    }

    /// The PID this error relates to, when known.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Error::ProcessNotFound { pid, .. } | Error::PermissionDenied { pid, .. } => *pid,
            Error::InvalidPid(pid) | Error::KillFailed { pid, .. } => Some(*pid),
            _ => None,
        }
    }

    /// Attach a port to errors that carry port context.
    pub(crate) fn with_port(mut self, value: u16) -> Self {
        match &mut self {
            Error::ProcessNotFound { port, .. }
            | Error::PermissionDenied { port, .. }
            | Error::OperationTimeout { port, .. } => *port = Some(value),
            _ => {}
        }
        self
    }

    /// Whether this error only says the process is already gone.
    pub fn is_process_gone(&self) -> bool {
        matches!(self, Error::ProcessNotFound { .. })
    }

    /// Whether this error is a permission failure.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::PermissionDenied { .. })
    }
}

fn context(pid: &Option<u32>, port: &Option<u16>) -> String {
    match (*pid, *port) {
        (Some(pid), Some(port)) => format!(" (PID {} on port {})", pid, port),
        (Some(pid), None) => format!(" (PID {})", pid),
        (None, Some(port)) => format!(" on port {}", port),
        (None, None) => String::new(),
    }
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
    match *exit_code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}
