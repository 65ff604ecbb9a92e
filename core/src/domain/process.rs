//! Process and protocol domain models.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// Protocol
// ============================================================================

/// Transport protocol a socket is bound on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Lowercase name, as used by `lsof -i` and in JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ProtocolFilter
// ============================================================================

/// Restricts enumeration and termination to one transport, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFilter {
    Tcp,
    Udp,
    #[default]
    Both,
}

impl ProtocolFilter {
    /// The transports covered by this filter, TCP first.
    pub fn protocols(&self) -> &'static [Protocol] {
        match self {
            ProtocolFilter::Tcp => &[Protocol::Tcp],
            ProtocolFilter::Udp => &[Protocol::Udp],
            ProtocolFilter::Both => &[Protocol::Tcp, Protocol::Udp],
        }
    }

    /// Check whether a protocol passes this filter.
    pub fn matches(&self, protocol: Protocol) -> bool {
        self.protocols().contains(&protocol)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFilter::Tcp => "tcp",
            ProtocolFilter::Udp => "udp",
            ProtocolFilter::Both => "both",
        }
    }
}

impl From<Protocol> for ProtocolFilter {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => ProtocolFilter::Tcp,
            Protocol::Udp => ProtocolFilter::Udp,
        }
    }
}

impl FromStr for ProtocolFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(ProtocolFilter::Tcp),
            "udp" => Ok(ProtocolFilter::Udp),
            "both" => Ok(ProtocolFilter::Both),
            other => Err(Error::Config(format!(
                "Invalid protocol '{}': expected tcp, udp or both",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ProtocolFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ProcessInfo
// ============================================================================

/// A process that owns a socket on a given port.
///
/// Records only live for one lookup/kill cycle. `pid` is always non-zero:
/// adapters drop placeholder rows before a record is ever built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Process ID of the owning process.
    pub pid: u32,
    /// Short process name (e.g. "node").
    pub name: String,
    /// The port number the process is bound to.
    pub port: u16,
    /// Transport the socket uses.
    pub protocol: Protocol,
    /// Full command line, when the platform could provide it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Owning user, when the platform could provide it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ProcessInfo {
    /// Create a record with no command or user details.
    pub fn new(pid: u32, name: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            pid,
            name: name.into(),
            port,
            protocol,
            command: None,
            user: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Deduplication key: two records with the same key describe the same socket owner.
    pub fn key(&self) -> (u32, u16, Protocol) {
        (self.pid, self.port, self.protocol)
    }
}

impl std::fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (PID: {}) on {}/{}",
            self.name, self.pid, self.protocol, self.port
        )
    }
}

/// Drop PID 0 placeholders and duplicate `(pid, port, protocol)` records.
///
/// Keeps the first occurrence of each key, so discovery order survives.
pub fn dedup_processes(records: impl IntoIterator<Item = ProcessInfo>) -> Vec<ProcessInfo> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|p| p.pid != 0)
        .filter(|p| seen.insert(p.key()))
        .collect()
}
