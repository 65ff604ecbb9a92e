//! Scripted in-memory adapter for application-layer tests.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::domain::{dedup_processes, ProcessInfo, Protocol, ProtocolFilter};
use crate::error::{Error, Result};
use crate::ports::PlatformAdapter;

/// How a mock process reacts to a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KillBehavior {
    /// Exits on the first request, graceful or not.
    ExitOnTerm,
    /// Ignores graceful requests, exits when forced.
    ExitOnKill,
    /// Accepts every request and keeps running.
    Immortal,
    /// The OS refuses to signal it.
    Denied,
    /// Exits on its own just before the request lands.
    Vanished,
    /// The kill primitive itself fails.
    Broken,
}

/// A scripted failure for lookups on one port.
#[derive(Debug, Clone)]
pub(crate) enum LookupFailure {
    Command(String),
    Denied,
    Panic,
}

#[derive(Debug, Default)]
struct MockState {
    listeners: Vec<ProcessInfo>,
    running: HashSet<u32>,
    behaviors: HashMap<u32, KillBehavior>,
    failures: HashMap<u16, LookupFailure>,
    sticky: HashSet<u16>,
    kills: Vec<(u32, bool)>,
    lookups: Vec<u16>,
    probes: Vec<u32>,
}

/// Mock platform for testing.
///
/// Sockets disappear with their owning process, so killing a listener
/// frees its port unless the port was marked sticky.
#[derive(Debug, Default)]
pub(crate) struct MockAdapter {
    state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a running process bound to `port`.
    pub fn listen(self, pid: u32, name: &str, port: u16, protocol: Protocol) -> Self {
        self.bind(ProcessInfo::new(pid, name, port, protocol));
        self
    }

    /// Add a running process that owns no socket.
    pub fn spawn(self, pid: u32) -> Self {
        self.state.lock().running.insert(pid);
        self
    }

    pub fn on_kill(self, pid: u32, behavior: KillBehavior) -> Self {
        self.state.lock().behaviors.insert(pid, behavior);
        self
    }

    pub fn fail_lookup(self, port: u16, failure: LookupFailure) -> Self {
        self.state.lock().failures.insert(port, failure);
        self
    }

    /// Keep reporting owners of `port` after they exit (socket in TIME_WAIT, say).
    pub fn keep_busy(self, port: u16) -> Self {
        self.state.lock().sticky.insert(port);
        self
    }

    pub fn bind(&self, record: ProcessInfo) {
        let mut state = self.state.lock();
        state.running.insert(record.pid);
        state.listeners.push(record);
    }

    /// The process exits by itself.
    pub fn exit(&self, pid: u32) {
        self.state.lock().running.remove(&pid);
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().running.contains(&pid)
    }

    /// Every `(pid, force)` kill request, in order.
    pub fn kills(&self) -> Vec<(u32, bool)> {
        self.state.lock().kills.clone()
    }

    /// Every port looked up, in order.
    pub fn lookups(&self) -> Vec<u16> {
        self.state.lock().lookups.clone()
    }

    /// Every PID checked with `is_process_running`, in order.
    pub fn probes(&self) -> Vec<u32> {
        self.state.lock().probes.clone()
    }
}

impl PlatformAdapter for MockAdapter {
    async fn find_processes_by_port(
        &self,
        port: u16,
        protocol: ProtocolFilter,
    ) -> Result<Vec<ProcessInfo>> {
        let mut state = self.state.lock();
        state.lookups.push(port);

        match state.failures.get(&port).cloned() {
            Some(LookupFailure::Command(stderr)) => {
                return Err(Error::CommandFailed {
                    command: format!("lsof -nP -iTCP:{}", port),
                    exit_code: Some(1),
                    stderr,
                })
            }
            Some(LookupFailure::Denied) => {
                return Err(Error::PermissionDenied {
                    message: "lsof: permission denied".to_string(),
                    pid: None,
                    port: Some(port),
                })
            }
            Some(LookupFailure::Panic) => {
                drop(state);
                panic!("scripted lookup panic on port {}", port);
            }
            None => {}
        }

        let sticky = state.sticky.contains(&port);
        let owners = state
            .listeners
            .iter()
            .filter(|r| r.port == port && protocol.matches(r.protocol))
            .filter(|r| sticky || state.running.contains(&r.pid))
            .cloned()
            .collect::<Vec<_>>();
        Ok(dedup_processes(owners))
    }

    async fn kill_process(&self, pid: u32, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.kills.push((pid, force));

        if !state.running.contains(&pid) {
            return Err(Error::ProcessNotFound {
                pid: Some(pid),
                port: None,
            });
        }

        let behavior = state
            .behaviors
            .get(&pid)
            .copied()
            .unwrap_or(KillBehavior::ExitOnTerm);
        match behavior {
            KillBehavior::ExitOnTerm => {
                state.running.remove(&pid);
                Ok(())
            }
            KillBehavior::ExitOnKill => {
                if force {
                    state.running.remove(&pid);
                }
                Ok(())
            }
            KillBehavior::Immortal => Ok(()),
            KillBehavior::Denied => Err(Error::PermissionDenied {
                message: format!("not allowed to signal PID {}", pid),
                pid: Some(pid),
                port: None,
            }),
            KillBehavior::Vanished => {
                state.running.remove(&pid);
                Err(Error::ProcessNotFound {
                    pid: Some(pid),
                    port: None,
                })
            }
            KillBehavior::Broken => Err(Error::KillFailed {
                pid,
                signal: Some(if force { "SIGKILL" } else { "SIGTERM" }.to_string()),
                reason: "Operation not supported".to_string(),
            }),
        }
    }

    async fn is_process_running(&self, pid: u32) -> bool {
        let mut state = self.state.lock();
        state.probes.push(pid);
        state.running.contains(&pid)
    }
}
