//! Platform command adapters.
//!
//! One adapter per OS family, all compiled on every target so their
//! parsers can be tested anywhere. [`SystemAdapter`] picks exactly one of
//! them from an explicitly passed [`PlatformKind`].

pub mod command;
mod darwin;
mod linux;
mod parse;
mod unix;
mod windows;

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::{dedup_processes, validate_pid, ProcessInfo, Protocol, ProtocolFilter};
use crate::error::{Error, Result};
use crate::ports::PlatformAdapter;

pub use command::{execute_command, CommandOutput, DEFAULT_COMMAND_TIMEOUT};

use darwin::DarwinAdapter;
use linux::LinuxAdapter;
use windows::WindowsAdapter;

/// Supported operating system families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    Linux,
    MacOs,
    Windows,
}

impl PlatformKind {
    /// Detect the platform this binary was built for.
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS name (as in `std::env::consts::OS`) to a platform.
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(PlatformKind::Linux),
            "macos" => Ok(PlatformKind::MacOs),
            "windows" => Ok(PlatformKind::Windows),
            other => Err(Error::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlatformKind::Linux => "linux",
            PlatformKind::MacOs => "macos",
            PlatformKind::Windows => "windows",
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The production adapter: shells out to the native tools of one platform.
#[derive(Debug, Clone)]
pub struct SystemAdapter {
    inner: Backend,
}

#[derive(Debug, Clone)]
enum Backend {
    Linux(LinuxAdapter),
    MacOs(DarwinAdapter),
    Windows(WindowsAdapter),
}

impl SystemAdapter {
    /// Create an adapter for `kind`, bounding every helper by `command_timeout`.
    pub fn new(kind: PlatformKind, command_timeout: Duration) -> Self {
        let inner = match kind {
            PlatformKind::Linux => Backend::Linux(LinuxAdapter::new(command_timeout)),
            PlatformKind::MacOs => Backend::MacOs(DarwinAdapter::new(command_timeout)),
            PlatformKind::Windows => Backend::Windows(WindowsAdapter::new(command_timeout)),
        };
        Self { inner }
    }

    /// Create an adapter for the current platform with the default timeout.
    pub fn detect() -> Result<Self> {
        Ok(Self::new(PlatformKind::current()?, DEFAULT_COMMAND_TIMEOUT))
    }

    pub fn kind(&self) -> PlatformKind {
        match self.inner {
            Backend::Linux(_) => PlatformKind::Linux,
            Backend::MacOs(_) => PlatformKind::MacOs,
            Backend::Windows(_) => PlatformKind::Windows,
        }
    }

    async fn find_on_transport(&self, port: u16, protocol: Protocol) -> Result<Vec<ProcessInfo>> {
        match &self.inner {
            Backend::Linux(a) => a.find_on_transport(port, protocol).await,
            Backend::MacOs(a) => a.find_on_transport(port, protocol).await,
            Backend::Windows(a) => a.find_on_transport(port, protocol).await,
        }
    }
}

/// Union per-transport lookup results for `port`.
///
/// An error on one transport does not hide records found on another; the
/// first error is only returned when nothing was found at all.
fn merge_transport_results(
    port: u16,
    results: Vec<(Protocol, Result<Vec<ProcessInfo>>)>,
) -> Result<Vec<ProcessInfo>> {
    let mut records = Vec::new();
    let mut first_error = None;
    for (transport, result) in results {
        match result {
            Ok(found) => records.extend(found),
            Err(e) => {
                warn!(port = port, protocol = %transport, error = %e, "Lookup failed");
                first_error.get_or_insert(e);
            }
        }
    }

    let records = dedup_processes(records);
    match first_error {
        Some(e) if records.is_empty() => Err(e.with_port(port)),
        _ => Ok(records),
    }
}

impl PlatformAdapter for SystemAdapter {
    /// Query each transport in the filter independently and union the results.
    async fn find_processes_by_port(
        &self,
        port: u16,
        protocol: ProtocolFilter,
    ) -> Result<Vec<ProcessInfo>> {
        let transports = protocol.protocols();
        let lookups = transports.iter().map(|&p| self.find_on_transport(port, p));
        let results = join_all(lookups).await;

        let records =
            merge_transport_results(port, transports.iter().copied().zip(results).collect())?;
        debug!(port = port, found = records.len(), "Port lookup finished");
        Ok(records)
    }

    /// PID 0 and values that wrap to a negative `pid_t` address process
    /// groups, so they are rejected before reaching the platform.
    async fn kill_process(&self, pid: u32, force: bool) -> Result<()> {
        validate_pid(pid)?;
        match &self.inner {
            Backend::Linux(a) => a.kill(pid, force).await,
            Backend::MacOs(a) => a.kill(pid, force).await,
            Backend::Windows(a) => a.kill(pid, force).await,
        }
    }

    async fn is_process_running(&self, pid: u32) -> bool {
        if validate_pid(pid).is_err() {
            return false;
        }
        match &self.inner {
            Backend::Linux(a) => a.is_running(pid).await,
            Backend::MacOs(a) => a.is_running(pid).await,
            Backend::Windows(a) => a.is_running(pid).await,
        }
    }
}
