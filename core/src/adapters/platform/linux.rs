//! Linux adapter: lsof first, ss as the fallback.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::domain::{ProcessInfo, Protocol};
use crate::error::{Error, Result};

use super::command::execute_command;
use super::parse::parse_address;
use super::unix;

static SS_USERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\("((?:[^"\\]|\\.)*)",pid=(\d+),fd=\d+\)"#).expect("ss users pattern is valid")
});

/// Linux-specific adapter.
#[derive(Debug, Clone)]
pub struct LinuxAdapter {
    timeout: Duration,
}

/// Rows from `ss` matching the requested port.
#[derive(Debug, Default)]
struct SsScan {
    records: Vec<ProcessInfo>,
    /// A matching socket was listed without a `users:` column.
    unattributed: bool,
}

impl LinuxAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn find_on_transport(
        &self,
        port: u16,
        protocol: Protocol,
    ) -> Result<Vec<ProcessInfo>> {
        let records = match unix::lsof_find(port, protocol, self.timeout).await {
            Ok(records) => records,
            Err(e) => {
                debug!(port = port, %protocol, error = %e, "lsof gave no result, trying ss");
                self.find_with_ss(port, protocol).await?
            }
        };
        Ok(unix::enrich_from_ps(records, self.timeout).await)
    }

    /// Fallback lookup with ss.
    ///
    /// Executes: `ss -Hlnpt` / `ss -Hlnpu`
    ///
    /// Without root, ss lists other users' sockets but hides their owners.
    /// That case is reported as `CommandFailed` instead of an empty result.
    async fn find_with_ss(&self, port: u16, protocol: Protocol) -> Result<Vec<ProcessInfo>> {
        let flags = match protocol {
            Protocol::Tcp => "-Hlnpt",
            Protocol::Udp => "-Hlnpu",
        };

        let output = match execute_command("ss", &[flags], self.timeout).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                let error = output.into_failure();
                debug!(port = port, error = %error, "ss failed, nothing found");
                return Ok(Vec::new());
            }
            Err(e) => {
                debug!(port = port, error = %e, "ss unavailable, nothing found");
                return Ok(Vec::new());
            }
        };

        let scan = parse_ss_output(&output.stdout, port, protocol);
        if scan.records.is_empty() && scan.unattributed {
            return Err(Error::CommandFailed {
                command: output.command,
                exit_code: output.exit_code,
                stderr: format!(
                    "port {} ({}) is in use but the owning process could not be determined",
                    port, protocol
                ),
            });
        }
        Ok(scan.records)
    }

    pub async fn kill(&self, pid: u32, force: bool) -> Result<()> {
        unix::send_signal(pid, force)
    }

    pub async fn is_running(&self, pid: u32) -> bool {
        unix::process_exists(pid)
    }
}

/// Parse `ss -Hlnp` output for sockets bound to `port`.
///
/// Expected format (one socket per line, no header):
/// ```text
/// LISTEN 0 4096 127.0.0.1:3000 0.0.0.0:* users:(("node",pid=53561,fd=187))
/// UNCONN 0 0    0.0.0.0:5353   0.0.0.0:* users:(("avahi",pid=611,fd=12),("avahi",pid=612,fd=12))
/// ```
fn parse_ss_output(output: &str, port: u16, protocol: Protocol) -> SsScan {
    let mut scan = SsScan::default();

    for line in output.lines() {
        let components: Vec<&str> = line.split_whitespace().collect();
        if components.len() < 5 || matches!(components[0], "State" | "Netid") {
            continue;
        }

        let Some((_, local_port)) = parse_address(components[3]) else {
            continue;
        };
        if local_port != port {
            continue;
        }

        let process_column = components[5..].join(" ");
        let before = scan.records.len();
        for caps in SS_USERS.captures_iter(&process_column) {
            let Ok(pid) = caps[2].parse::<u32>() else {
                continue;
            };
            scan.records.push(ProcessInfo::new(pid, &caps[1], port, protocol));
        }
        if scan.records.len() == before {
            scan.unattributed = true;
        }
    }

    scan
}
