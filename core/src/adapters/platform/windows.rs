//! Windows adapter.
//!
//! Uses `netstat -ano` to find listening sockets, `tasklist /FO CSV` to
//! resolve process names and `taskkill` to terminate. PowerShell's
//! `Get-NetTCPConnection` / `Get-NetUDPEndpoint` serve as the fallback.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{ProcessInfo, Protocol};
use crate::error::{Error, Result};

use super::command::execute_command;
use super::parse::{parse_address, parse_csv_line};

/// Windows-specific adapter.
#[derive(Debug, Clone)]
pub struct WindowsAdapter {
    timeout: Duration,
}

/// Owning PIDs reported by the PowerShell fallback.
#[derive(Debug, Default, PartialEq)]
struct OwnerScan {
    pids: Vec<u32>,
    /// Rows were reported but none carried a usable PID.
    unattributed: bool,
}

impl WindowsAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn find_on_transport(
        &self,
        port: u16,
        protocol: Protocol,
    ) -> Result<Vec<ProcessInfo>> {
        let pids = match self.pids_from_netstat(port, protocol).await {
            Ok(pids) => pids,
            Err(e) => {
                debug!(port = port, %protocol, error = %e, "netstat failed, trying PowerShell");
                self.pids_from_powershell(port, protocol).await?
            }
        };

        // Skip PID 0 and repeated PIDs before paying for a tasklist call each
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(pids.len());
        for pid in pids.into_iter().filter(|pid| *pid != 0 && seen.insert(*pid)) {
            let name = self
                .process_name(pid)
                .await
                .unwrap_or_else(|| "unknown".to_string());
            records.push(ProcessInfo::new(pid, name, port, protocol));
        }
        Ok(records)
    }

    /// Executes: `netstat -ano`
    ///
    /// IPv4 and IPv6 rows for the same listener both appear, so the same
    /// PID is usually listed twice; callers deduplicate.
    async fn pids_from_netstat(&self, port: u16, protocol: Protocol) -> Result<Vec<u32>> {
        let output = execute_command("netstat", &["-ano"], self.timeout).await?;
        if !output.success() {
            return Err(output.into_failure());
        }
        Ok(parse_netstat_output(&output.stdout, port, protocol))
    }

    /// Executes: `powershell -NoProfile -NonInteractive -Command Get-Net... | OwningProcess`
    async fn pids_from_powershell(&self, port: u16, protocol: Protocol) -> Result<Vec<u32>> {
        let script = match protocol {
            Protocol::Tcp => format!(
                "Get-NetTCPConnection -LocalPort {} -State Listen -ErrorAction SilentlyContinue \
                 | Select-Object -ExpandProperty OwningProcess",
                port
            ),
            Protocol::Udp => format!(
                "Get-NetUDPEndpoint -LocalPort {} -ErrorAction SilentlyContinue \
                 | Select-Object -ExpandProperty OwningProcess",
                port
            ),
        };

        let args = ["-NoProfile", "-NonInteractive", "-Command", script.as_str()];
        let output = match execute_command("powershell", &args, self.timeout).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                let error = output.into_failure();
                debug!(port = port, error = %error, "PowerShell lookup failed, nothing found");
                return Ok(Vec::new());
            }
            Err(e) => {
                debug!(port = port, error = %e, "PowerShell unavailable, nothing found");
                return Ok(Vec::new());
            }
        };

        let scan = parse_owning_processes(&output.stdout);
        if scan.pids.is_empty() && scan.unattributed {
            return Err(Error::CommandFailed {
                command: output.command,
                exit_code: output.exit_code,
                stderr: format!(
                    "port {} ({}) is in use but the owning process could not be determined",
                    port, protocol
                ),
            });
        }
        Ok(scan.pids)
    }

    /// Executes: `tasklist /FI "PID eq <pid>" /FO CSV /NH`
    async fn process_name(&self, pid: u32) -> Option<String> {
        let filter = format!("PID eq {}", pid);
        let args = ["/FI", filter.as_str(), "/FO", "CSV", "/NH"];
        match execute_command("tasklist", &args, self.timeout).await {
            Ok(output) if output.success() => find_tasklist_row(&output.stdout, pid),
            Ok(_) => None,
            Err(e) => {
                debug!(pid = pid, error = %e, "tasklist lookup failed");
                None
            }
        }
    }

    /// Terminate a process using taskkill.
    ///
    /// Plain `taskkill /PID n` posts WM_CLOSE; `/F` calls TerminateProcess.
    pub async fn kill(&self, pid: u32, force: bool) -> Result<()> {
        let pid_arg = pid.to_string();
        let mut args = vec!["/PID", pid_arg.as_str()];
        if force {
            args.push("/F");
        }

        let output = execute_command("taskkill", &args, self.timeout).await?;
        if output.success() {
            debug!(pid = pid, force = force, "taskkill succeeded");
            return Ok(());
        }

        let combined = format!("{} {}", output.stdout, output.stderr);
        match classify_taskkill_failure(&combined) {
            TaskkillFailure::NotFound => Err(Error::ProcessNotFound {
                pid: Some(pid),
                port: None,
            }),
            TaskkillFailure::AccessDenied => {
                warn!(pid = pid, "Access denied to kill process");
                Err(Error::PermissionDenied {
                    message: format!("taskkill was denied access to PID {}", pid),
                    pid: Some(pid),
                    port: None,
                })
            }
            TaskkillFailure::AlreadyExited => Ok(()),
            TaskkillFailure::Other => Err(Error::KillFailed {
                pid,
                signal: Some(if force { "taskkill /F" } else { "taskkill" }.to_string()),
                reason: combined.trim().to_string(),
            }),
        }
    }

    /// Check if a process is currently running using `tasklist`.
    ///
    /// Matches the PID column exactly; a substring test would treat PID 12
    /// as running whenever PID 1234 is. When `tasklist` itself fails the
    /// process is assumed to be running, so a kill is still attempted.
    pub async fn is_running(&self, pid: u32) -> bool {
        let filter = format!("PID eq {}", pid);
        let args = ["/FI", filter.as_str(), "/FO", "CSV", "/NH"];
        match execute_command("tasklist", &args, self.timeout).await {
            Ok(output) => {
                let running = output.success() && find_tasklist_row(&output.stdout, pid).is_some();
                debug!(pid = pid, running = running, "Process running check");
                running
            }
            Err(e) => {
                warn!(
                    pid = pid,
                    error = %e,
                    "Failed to check if process is running, assuming it is"
                );
                true
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum TaskkillFailure {
    NotFound,
    AccessDenied,
    AlreadyExited,
    Other,
}

fn classify_taskkill_failure(message: &str) -> TaskkillFailure {
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("could not be found") {
        TaskkillFailure::NotFound
    } else if lower.contains("access is denied") || lower.contains("access denied") {
        TaskkillFailure::AccessDenied
    } else if lower.contains("already been terminated") || lower.contains("has exited") {
        TaskkillFailure::AlreadyExited
    } else {
        TaskkillFailure::Other
    }
}

/// Parse the output of `netstat -ano` for owners of `port`.
///
/// Example output:
/// ```text
/// Active Connections
///
///   Proto  Local Address          Foreign Address        State           PID
///   TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1020
///   TCP    [::]:3000              [::]:0                 LISTENING       5432
///   UDP    0.0.0.0:5353           *:*                                    2204
/// ```
fn parse_netstat_output(output: &str, port: u16, protocol: Protocol) -> Vec<u32> {
    let mut pids = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(proto) = parts.first() else {
            continue;
        };

        // TCP rows: Proto, Local, Foreign, State, PID. UDP rows have no state.
        let pid_column = match (protocol, proto.to_ascii_uppercase().as_str()) {
            (Protocol::Tcp, "TCP") if parts.len() >= 5 && parts[3] == "LISTENING" => parts[4],
            (Protocol::Udp, "UDP") if parts.len() >= 4 => parts[parts.len() - 1],
            _ => continue,
        };

        let Some((_, local_port)) = parse_address(parts[1]) else {
            continue;
        };
        if local_port != port {
            continue;
        }

        if let Ok(pid) = pid_column.parse::<u32>() {
            pids.push(pid);
        }
    }

    pids
}

/// Parse `Select-Object -ExpandProperty OwningProcess` output (one PID per line).
fn parse_owning_processes(output: &str) -> OwnerScan {
    let mut scan = OwnerScan::default();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.parse::<u32>() {
            Ok(pid) if pid != 0 => scan.pids.push(pid),
            _ => scan.unattributed = true,
        }
    }
    if !scan.pids.is_empty() {
        scan.unattributed = false;
    }
    scan
}

/// Find the image name for `pid` in `tasklist /FO CSV /NH` output.
///
/// Example output:
/// ```text
/// "node.exe","5432","Console","1","45,000 K"
/// ```
///
/// When nothing matches tasklist prints an `INFO:` line instead.
fn find_tasklist_row(output: &str, pid: u32) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('"'))
        .map(parse_csv_line)
        .find(|fields| fields.len() >= 2 && fields[1].parse::<u32>().ok() == Some(pid))
        .map(|fields| {
            // Remove .exe extension for cleaner display
            let name = &fields[0];
            name.strip_suffix(".exe").unwrap_or(name).to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSTAT: &str = r#"
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1020
  TCP    0.0.0.0:3000           0.0.0.0:0              LISTENING       5432
  TCP    [::]:3000              [::]:0                 LISTENING       5432
  TCP    127.0.0.1:3000         127.0.0.1:50123        ESTABLISHED     5432
  TCP    127.0.0.1:50123        127.0.0.1:3000         ESTABLISHED     7788
  TCP    127.0.0.1:3000         127.0.0.1:50999        TIME_WAIT       0
  UDP    0.0.0.0:3000           *:*                                    2204
  UDP    [::]:5353              *:*                                    2204
"#;

    #[test]
    fn test_parse_netstat_tcp() {
        // Duplicate IPv4/IPv6 rows are kept here and removed by dedup later
        assert_eq!(parse_netstat_output(NETSTAT, 3000, Protocol::Tcp), vec![5432, 5432]);
        assert_eq!(parse_netstat_output(NETSTAT, 135, Protocol::Tcp), vec![1020]);
        assert!(parse_netstat_output(NETSTAT, 50123, Protocol::Tcp).is_empty());
    }

    #[test]
    fn test_parse_netstat_udp() {
        assert_eq!(parse_netstat_output(NETSTAT, 3000, Protocol::Udp), vec![2204]);
        assert_eq!(parse_netstat_output(NETSTAT, 5353, Protocol::Udp), vec![2204]);
        assert!(parse_netstat_output(NETSTAT, 135, Protocol::Udp).is_empty());
    }

    #[test]
    fn test_parse_owning_processes() {
        assert_eq!(
            parse_owning_processes("5432\r\n5432\r\n"),
            OwnerScan {
                pids: vec![5432, 5432],
                unattributed: false
            }
        );
        assert_eq!(parse_owning_processes(""), OwnerScan::default());

        let scan = parse_owning_processes("0\r\n");
        assert!(scan.pids.is_empty());
        assert!(scan.unattributed);
    }

    #[test]
    fn test_find_tasklist_row() {
        let output = "\"node.exe\",\"5432\",\"Console\",\"1\",\"45,000 K\"\r\n";
        assert_eq!(find_tasklist_row(output, 5432), Some("node".to_string()));
        assert_eq!(find_tasklist_row(output, 54), None);

        let none = "INFO: No tasks are running which match the specified criteria.\r\n";
        assert_eq!(find_tasklist_row(none, 5432), None);
    }

    #[test]
    fn test_classify_taskkill_failure() {
        assert_eq!(
            classify_taskkill_failure("ERROR: The process \"1234\" not found."),
            TaskkillFailure::NotFound
        );
        let denied = "ERROR: The process with PID 4 could not be terminated. \
                      Reason: Access is denied.";
        assert_eq!(classify_taskkill_failure(denied), TaskkillFailure::AccessDenied);

        let console = "ERROR: The process with PID 1 could not be terminated. \
                       Reason: This process can only be terminated forcefully (with /F option).";
        assert_eq!(classify_taskkill_failure(console), TaskkillFailure::Other);
    }

    // tasklist is absent off Windows, which exercises the failure path
    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_failed_liveness_check_counts_as_running() {
        let adapter = WindowsAdapter::new(Duration::from_secs(5));
        assert!(adapter.is_running(5432).await);
    }
}
