//! macOS adapter: lsof first, netstat as the fallback.

use std::time::Duration;

use tracing::debug;

use crate::domain::{ProcessInfo, Protocol};
use crate::error::{Error, Result};

use super::command::execute_command;
use super::parse::parse_dotted_address;
use super::unix;

/// macOS-specific adapter.
#[derive(Debug, Clone)]
pub struct DarwinAdapter {
    timeout: Duration,
}

impl DarwinAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn find_on_transport(
        &self,
        port: u16,
        protocol: Protocol,
    ) -> Result<Vec<ProcessInfo>> {
        match unix::lsof_find(port, protocol, self.timeout).await {
            Ok(records) => Ok(unix::enrich_from_ps(records, self.timeout).await),
            Err(e) => {
                debug!(port = port, %protocol, error = %e, "lsof gave no result, trying netstat");
                self.check_with_netstat(port, protocol).await
            }
        }
    }

    /// Fallback check with netstat.
    ///
    /// Executes: `netstat -an -p tcp` / `netstat -an -p udp`
    ///
    /// macOS netstat never reports PIDs, so this can only tell whether the
    /// port is busy. A busy port is reported as `CommandFailed`; an idle
    /// one (or a failing netstat) as an empty result.
    async fn check_with_netstat(
        &self,
        port: u16,
        protocol: Protocol,
    ) -> Result<Vec<ProcessInfo>> {
        let args = ["-an", "-p", protocol.as_str()];
        let output = match execute_command("netstat", &args, self.timeout).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                let error = output.into_failure();
                debug!(port = port, error = %error, "netstat failed, nothing found");
                return Ok(Vec::new());
            }
            Err(e) => {
                debug!(port = port, error = %e, "netstat unavailable, nothing found");
                return Ok(Vec::new());
            }
        };

        if netstat_shows_port(&output.stdout, port, protocol) {
            return Err(Error::CommandFailed {
                command: output.command,
                exit_code: output.exit_code,
                stderr: format!(
                    "port {} ({}) is in use but the owning process could not be determined",
                    port, protocol
                ),
            });
        }
        Ok(Vec::new())
    }

    pub async fn kill(&self, pid: u32, force: bool) -> Result<()> {
        unix::send_signal(pid, force)
    }

    pub async fn is_running(&self, pid: u32) -> bool {
        unix::process_exists(pid)
    }
}

/// Check BSD netstat output for a socket bound to `port`.
///
/// Expected format:
/// ```text
/// Active Internet connections (including servers)
/// Proto Recv-Q Send-Q  Local Address          Foreign Address        (state)
/// tcp4       0      0  127.0.0.1.3000         *.*                    LISTEN
/// udp4       0      0  *.5353                 *.*
/// ```
fn netstat_shows_port(output: &str, port: u16, protocol: Protocol) -> bool {
    output.lines().any(|line| {
        let components: Vec<&str> = line.split_whitespace().collect();
        if components.len() < 5 || !components[0].starts_with(protocol.as_str()) {
            return false;
        }
        let Some((_, local_port)) = parse_dotted_address(components[3]) else {
            return false;
        };
        match protocol {
            Protocol::Tcp => local_port == port && components.last() == Some(&"LISTEN"),
            Protocol::Udp => local_port == port,
        }
    })
}
