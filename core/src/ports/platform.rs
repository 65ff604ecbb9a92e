//! Platform adapter port (interface).

use crate::domain::{ProcessInfo, ProtocolFilter};
use crate::error::Result;

/// Port for OS-level process enumeration and termination.
///
/// This trait defines everything the finder and killer need from the
/// operating system. Implementations hide which tools they shell out to
/// (lsof, ss, netstat, taskkill, ...) and how their output is parsed.
pub trait PlatformAdapter: Send + Sync {
    /// Find processes owning `port` on the transports allowed by `protocol`.
    ///
    /// Returns an empty list when nothing owns the port or no enumeration
    /// tool is usable. Returns `Error::CommandFailed` when the port is
    /// positively busy but the owning PID cannot be recovered. Records
    /// are deduplicated by `(pid, port, protocol)` and never carry PID 0.
    fn find_processes_by_port(
        &self,
        port: u16,
        protocol: ProtocolFilter,
    ) -> impl std::future::Future<Output = Result<Vec<ProcessInfo>>> + Send;

    /// Send a termination request to exactly `pid`.
    ///
    /// `force == false` asks the process to exit (SIGTERM, plain taskkill);
    /// `force == true` kills it unconditionally (SIGKILL, taskkill /F).
    /// Returns `Error::ProcessNotFound` if the process is already gone and
    /// `Error::PermissionDenied` if the OS refuses.
    fn kill_process(
        &self,
        pid: u32,
        force: bool,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Check whether `pid` still exists.
    fn is_process_running(&self, pid: u32) -> impl std::future::Future<Output = bool> + Send;
}
