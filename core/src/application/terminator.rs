//! The public composition point: find and terminate across many ports.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::adapters::{PlatformKind, SystemAdapter};
use crate::config::Options;
use crate::domain::{ProcessInfo, TerminationResult};
use crate::error::{Error, Result};
use crate::ports::PlatformAdapter;

use super::{ProcessFinder, ProcessKiller};

const UNKNOWN_ERROR: &str = "Unknown error";

/// Terminates whatever owns a set of ports.
///
/// Per-port work is isolated: a failing lookup, a refused kill or even a
/// panic on one port never stops the remaining ports from being processed.
pub struct PortTerminator<A> {
    finder: ProcessFinder<A>,
    killer: ProcessKiller<A>,
    options: Options,
}

impl PortTerminator<SystemAdapter> {
    /// Build a terminator for the platform this binary runs on.
    pub fn system(options: Options) -> Result<Self> {
        options.validate()?;
        let kind = PlatformKind::current()?;
        debug!(platform = %kind, "Detected platform");
        Ok(Self::new(
            SystemAdapter::new(kind, options.command_timeout()),
            options,
        ))
    }
}

impl<A: PlatformAdapter> PortTerminator<A> {
    pub fn new(adapter: A, options: Options) -> Self {
        let adapter = Arc::new(adapter);
        Self {
            finder: ProcessFinder::new(Arc::clone(&adapter)),
            killer: ProcessKiller::new(adapter),
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn adapter(&self) -> &A {
        self.finder.adapter()
    }

    pub fn finder(&self) -> &ProcessFinder<A> {
        &self.finder
    }

    pub fn killer(&self) -> &ProcessKiller<A> {
        &self.killer
    }

    /// True iff every port ends with no owning process.
    pub async fn terminate(&self, ports: &[u16]) -> bool {
        self.terminate_multiple(ports)
            .await
            .values()
            .all(|cleared| *cleared)
    }

    /// Per-port success flags.
    pub async fn terminate_multiple(&self, ports: &[u16]) -> HashMap<u16, bool> {
        self.terminate_with_details(ports)
            .await
            .into_iter()
            .map(|result| (result.port, result.success))
            .collect()
    }

    /// Full per-port outcomes, in first-occurrence order of `ports`.
    pub async fn terminate_with_details(&self, ports: &[u16]) -> Vec<TerminationResult> {
        let mut seen = HashSet::new();
        let unique: Vec<u16> = ports.iter().copied().filter(|p| seen.insert(*p)).collect();

        join_all(unique.into_iter().map(|port| self.terminate_isolated(port))).await
    }

    async fn terminate_isolated(&self, port: u16) -> TerminationResult {
        let outcome = AssertUnwindSafe(self.terminate_port(port))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Error terminating processes on port {}: {}", port, e);
                TerminationResult::from_error(port, Vec::new(), &e)
            }
            Err(_) => {
                error!("Error terminating processes on port {}: {}", port, UNKNOWN_ERROR);
                TerminationResult::failed(port, Vec::new(), UNKNOWN_ERROR)
            }
        }
    }

    /// Terminate the owners of one port.
    ///
    /// Lookup failures are returned as errors. Kill failures and a port
    /// that stays busy come back as a failed `TerminationResult`.
    pub async fn terminate_port(&self, port: u16) -> Result<TerminationResult> {
        let options = &self.options;
        let processes = self.finder.find_by_port(port, options.protocol).await?;

        if processes.is_empty() {
            if !options.quiet {
                info!(port = port, "No processes found on port");
            }
            return Ok(TerminationResult::succeeded(port, processes));
        }

        if !options.quiet {
            for process in &processes {
                info!(port = port, pid = process.pid, "Terminating {}", process);
            }
        }

        let pids = unique_pids(&processes);
        let mut outcomes = self
            .killer
            .try_kill_processes(&pids, options.force, options.graceful_timeout())
            .await;

        for pid in pids {
            let failure = match outcomes.remove(&pid) {
                Some(Ok(true)) | None => continue,
                Some(Ok(false)) => Error::KillFailed {
                    pid,
                    signal: None,
                    reason: "process is still running after a forced kill".to_string(),
                },
                Some(Err(e)) => e,
            };
            warn!(port = port, pid = pid, error = %failure, "Failed to terminate process");
            return Ok(TerminationResult::from_error(port, processes, &failure.with_port(port)));
        }

        let cleared = self
            .finder
            .wait_for_port_to_be_available(port, options.overall_timeout(), options.protocol)
            .await;
        if !cleared {
            let failure = self.port_timeout(port, options.overall_timeout());
            warn!(port = port, error = %failure, "Port still in use");
            return Ok(TerminationResult::from_error(port, processes, &failure));
        }

        if !options.quiet {
            info!(port = port, count = processes.len(), "Port cleared");
        }
        Ok(TerminationResult::succeeded(port, processes))
    }

    /// Processes currently owning `port`.
    pub async fn get_processes(&self, port: u16) -> Result<Vec<ProcessInfo>> {
        self.finder.find_by_port(port, self.options.protocol).await
    }

    pub async fn is_port_available(&self, port: u16) -> bool {
        self.finder
            .is_port_available(port, self.options.protocol)
            .await
    }

    /// Wait for `port` to become free, by default for the overall timeout.
    pub async fn wait_for_port(&self, port: u16, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| self.options.overall_timeout());
        if self
            .finder
            .wait_for_port_to_be_available(port, timeout, self.options.protocol)
            .await
        {
            Ok(())
        } else {
            Err(self.port_timeout(port, timeout))
        }
    }

    fn port_timeout(&self, port: u16, timeout: Duration) -> Error {
        Error::OperationTimeout {
            operation: format!("waiting for port {} to become available", port),
            timeout_ms: timeout.as_millis() as u64,
            port: Some(port),
        }
    }
}

/// PIDs in discovery order, each once.
fn unique_pids(processes: &[ProcessInfo]) -> Vec<u32> {
    let mut seen = HashSet::new();
    processes
        .iter()
        .map(|p| p.pid)
        .filter(|pid| seen.insert(*pid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{KillBehavior, LookupFailure, MockAdapter};
    use crate::domain::{Protocol, ProtocolFilter};
    use tokio_test::{assert_err, assert_ok};
    use tracing_test::traced_test;

    fn options() -> Options {
        Options::default()
            .with_graceful_timeout_ms(1_000)
            .with_overall_timeout_ms(3_000)
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_frees_ports() {
        let terminator = PortTerminator::new(
            MockAdapter::new()
                .listen(100, "node", 3000, Protocol::Tcp)
                .listen(101, "vite", 5173, Protocol::Tcp),
            options(),
        );

        assert!(terminator.terminate(&[3000, 5173, 9999]).await);
        assert!(terminator.is_port_available(3000).await);
        assert!(terminator.is_port_available(5173).await);
        assert_eq!(terminator.adapter().kills(), vec![(100, false), (101, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_option() {
        let terminator = PortTerminator::new(
            MockAdapter::new()
                .listen(100, "node", 3000, Protocol::Tcp)
                .on_kill(100, KillBehavior::ExitOnKill),
            options().with_force(true),
        );

        assert!(terminator.terminate(&[3000]).await);
        assert_eq!(terminator.adapter().kills(), vec![(100, true)]);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_panicking_lookup_is_isolated() {
        let terminator = PortTerminator::new(
            MockAdapter::new().fail_lookup(3000, LookupFailure::Panic),
            options(),
        );

        let results = terminator.terminate_multiple(&[3000, 3001]).await;
        assert_eq!(results.len(), 2);
        assert!(!results[&3000]);
        assert!(results[&3001]);

        logs_assert(|lines: &[&str]| {
            let unknown: Vec<_> = lines
                .iter()
                .filter(|line| line.contains("Unknown error"))
                .collect();
            match unknown.as_slice() {
                [line] if line.contains("Error terminating processes on port 3000") => Ok(()),
                other => Err(format!("expected one 'Unknown error' line, got {:?}", other)),
            }
        });
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_lookup_error_message() {
        let terminator = PortTerminator::new(
            MockAdapter::new()
                .listen(7, "api", 8080, Protocol::Tcp)
                .fail_lookup(3000, LookupFailure::Command("lsof: unexpected output".to_string())),
            options(),
        );

        let results = terminator.terminate_with_details(&[3000, 8080]).await;
        assert_eq!(results[0].port, 3000);
        assert!(!results[0].success);
        assert_eq!(results[0].error_code.as_deref(), Some("COMMAND_EXECUTION_FAILED"));
        assert!(results[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("lsof: unexpected output")));
        assert!(results[1].success);

        assert!(logs_contain(
            "Error terminating processes on port 3000: Command execution failed"
        ));
        assert!(!logs_contain("Unknown error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_details_keep_order_and_processes() {
        let terminator = PortTerminator::new(
            MockAdapter::new()
                .listen(30, "dnsmasq", 53, Protocol::Udp)
                .listen(30, "dnsmasq", 53, Protocol::Tcp)
                .listen(40, "redis", 6379, Protocol::Tcp),
            options(),
        );

        let results = terminator.terminate_with_details(&[6379, 53, 6379]).await;
        let ports: Vec<u16> = results.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![6379, 53]);
        assert_eq!(results[1].processes.len(), 2);
        assert_eq!(results[1].processes[0].protocol, Protocol::Udp);
        assert!(results.iter().all(|r| r.success && r.error.is_none()));
        // One PID, two sockets, one kill
        assert_eq!(
            terminator
                .adapter()
                .kills()
                .iter()
                .filter(|(pid, _)| *pid == 30)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_result() {
        let terminator = PortTerminator::new(
            MockAdapter::new()
                .listen(1, "launchd", 80, Protocol::Tcp)
                .on_kill(1, KillBehavior::Denied),
            options(),
        );

        let results = terminator.terminate_with_details(&[80]).await;
        assert!(!results[0].success);
        assert!(results[0].is_permission_denied());
        assert_eq!(results[0].processes[0].pid, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_that_stays_busy_fails() {
        let terminator = PortTerminator::new(
            MockAdapter::new()
                .listen(50, "java", 8443, Protocol::Tcp)
                .keep_busy(8443),
            options(),
        );

        let start = tokio::time::Instant::now();
        let results = terminator.terminate_with_details(&[8443]).await;
        assert!(!results[0].success);
        assert_eq!(results[0].error_code.as_deref(), Some("OPERATION_TIMEOUT"));
        assert!(start.elapsed() >= options().overall_timeout());
        assert!(!terminator.adapter().is_alive(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_option_limits_targets() {
        let terminator = PortTerminator::new(
            MockAdapter::new()
                .listen(60, "web", 8000, Protocol::Tcp)
                .listen(61, "game", 8000, Protocol::Udp),
            options().with_protocol(ProtocolFilter::Udp),
        );

        assert_eq!(terminator.get_processes(8000).await.unwrap().len(), 1);
        assert!(terminator.terminate(&[8000]).await);
        assert!(terminator.adapter().is_alive(60));
        assert!(!terminator.adapter().is_alive(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_port() {
        let terminator = PortTerminator::new(
            MockAdapter::new().listen(70, "db", 5432, Protocol::Tcp),
            options(),
        );

        assert_ok!(terminator.wait_for_port(6543, None).await);

        let err = assert_err!(
            terminator
                .wait_for_port(5432, Some(Duration::from_millis(600)))
                .await
        );
        assert_eq!(err.code(), "OPERATION_TIMEOUT");
        assert_eq!(err.port(), Some(5432));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let terminator = PortTerminator::new(MockAdapter::new(), options());
        assert!(terminator.terminate(&[]).await);
        assert!(terminator.terminate_with_details(&[]).await.is_empty());
    }
}
