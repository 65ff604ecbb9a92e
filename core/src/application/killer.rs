//! Process termination with graceful-then-forceful escalation.
//!
//! Each PID walks a small state machine:
//!
//! ```text
//! Requested -> GracefulSent -> { Exited | TimedOut } -> ForceSent -> { Exited | Survived }
//! ```
//!
//! With `force` set, `Requested` goes straight to `ForceSent`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::domain::{validate_pid, ProcessInfo, ProtocolFilter};
use crate::error::Result;
use crate::ports::PlatformAdapter;

use super::ProcessFinder;

/// Delay between two liveness checks while waiting for a PID to exit.
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a force-killed process gets to disappear.
pub const FORCE_KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillPhase {
    Requested,
    GracefulSent,
    TimedOut,
    ForceSent,
    Exited,
    Survived,
}

/// The processes found on a port and what happened to each PID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortKill {
    /// Processes that were targeted, in discovery order.
    pub processes: Vec<ProcessInfo>,
    /// Per-PID success. Failed attempts are `false`.
    pub outcomes: HashMap<u32, bool>,
}

impl PortKill {
    pub fn all_killed(&self) -> bool {
        self.outcomes.values().all(|killed| *killed)
    }
}

/// Application service for terminating processes.
pub struct ProcessKiller<A> {
    adapter: Arc<A>,
    finder: ProcessFinder<A>,
}

impl<A> Clone for ProcessKiller<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            finder: self.finder.clone(),
        }
    }
}

impl<A: PlatformAdapter> ProcessKiller<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self {
            finder: ProcessFinder::new(Arc::clone(&adapter)),
            adapter,
        }
    }

    /// Terminate one PID.
    ///
    /// Returns `Ok(true)` once the process is gone (including when it was
    /// already gone), `Ok(false)` when it outlived a forced kill, and an
    /// error for invalid PIDs, refused permission or a failing kill primitive.
    pub async fn kill_process(
        &self,
        pid: u32,
        force: bool,
        graceful_timeout: Duration,
    ) -> Result<bool> {
        validate_pid(pid)?;

        if !self.adapter.is_process_running(pid).await {
            debug!(pid = pid, "Process already gone");
            return Ok(true);
        }

        let mut phase = KillPhase::Requested;
        loop {
            phase = match phase {
                KillPhase::Requested if force => self.force(pid).await?,
                KillPhase::Requested => match self.adapter.kill_process(pid, false).await {
                    Ok(()) => KillPhase::GracefulSent,
                    Err(e) if e.is_process_gone() => KillPhase::Exited,
                    Err(e) if e.is_permission_denied() => return Err(e),
                    Err(e) => {
                        warn!(pid = pid, error = %e, "Graceful termination failed, escalating");
                        KillPhase::TimedOut
                    }
                },
                KillPhase::GracefulSent => {
                    if self.wait_for_exit(pid, graceful_timeout).await {
                        KillPhase::Exited
                    } else {
                        KillPhase::TimedOut
                    }
                }
                KillPhase::TimedOut => self.force(pid).await?,
                KillPhase::ForceSent => {
                    if self.wait_for_exit(pid, FORCE_KILL_GRACE).await {
                        KillPhase::Exited
                    } else {
                        KillPhase::Survived
                    }
                }
                KillPhase::Exited => return Ok(true),
                KillPhase::Survived => {
                    warn!(pid = pid, "Process still running after forced kill");
                    return Ok(false);
                }
            };
            debug!(pid = pid, phase = ?phase, "Kill phase");
        }
    }

    async fn force(&self, pid: u32) -> Result<KillPhase> {
        match self.adapter.kill_process(pid, true).await {
            Ok(()) => Ok(KillPhase::ForceSent),
            Err(e) if e.is_process_gone() => Ok(KillPhase::Exited),
            Err(e) => Err(e),
        }
    }

    /// Poll until `pid` exits. Returns false if it is still running at the deadline.
    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.adapter.is_process_running(pid).await {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(EXIT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Terminate several PIDs concurrently, keeping each PID's outcome.
    pub async fn try_kill_processes(
        &self,
        pids: &[u32],
        force: bool,
        graceful_timeout: Duration,
    ) -> HashMap<u32, Result<bool>> {
        let mut unique = pids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let kills = unique
            .iter()
            .map(|&pid| self.kill_process(pid, force, graceful_timeout));
        unique.iter().copied().zip(join_all(kills).await).collect()
    }

    /// Terminate several PIDs; a failed PID maps to `false`.
    pub async fn kill_processes(
        &self,
        pids: &[u32],
        force: bool,
        graceful_timeout: Duration,
    ) -> HashMap<u32, bool> {
        self.try_kill_processes(pids, force, graceful_timeout)
            .await
            .into_iter()
            .map(|(pid, result)| {
                let killed = result.unwrap_or_else(|e| {
                    warn!(pid = pid, error = %e, "Failed to kill process");
                    false
                });
                (pid, killed)
            })
            .collect()
    }

    /// Find the owners of `port` and terminate each of them once.
    pub async fn kill_port(
        &self,
        port: u16,
        force: bool,
        graceful_timeout: Duration,
        protocol: ProtocolFilter,
    ) -> Result<PortKill> {
        let processes = self.finder.find_by_port(port, protocol).await?;
        let pids: Vec<u32> = processes.iter().map(|p| p.pid).collect();
        let outcomes = self.kill_processes(&pids, force, graceful_timeout).await;
        Ok(PortKill {
            processes,
            outcomes,
        })
    }

    /// Find the owners of `port`, terminate them and return who was targeted.
    pub async fn kill_processes_by_port(
        &self,
        port: u16,
        force: bool,
        graceful_timeout: Duration,
        protocol: ProtocolFilter,
    ) -> Result<Vec<ProcessInfo>> {
        Ok(self
            .kill_port(port, force, graceful_timeout, protocol)
            .await?
            .processes)
    }
}
