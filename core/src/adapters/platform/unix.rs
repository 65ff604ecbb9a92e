//! Pieces shared by the Linux and macOS adapters: lsof lookup, ps
//! enrichment and signal delivery.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::domain::{ProcessInfo, Protocol};
use crate::error::{Error, Result};

use super::command::execute_command;
use super::parse::{decode_escaped, parse_address, truncate_command};

/// Find processes on `port` with lsof.
///
/// Executes: `lsof -nP -iTCP:<port> -sTCP:LISTEN` (or `-iUDP:<port>`)
///
/// Flags explained:
/// - -n / -P: don't resolve hostnames or service names
/// - -iTCP:<port>: restrict to one transport and port
/// - -sTCP:LISTEN: only listening TCP sockets, not clients connected to the port
///
/// lsof exits 1 when nothing matches, which is reported as an error so the
/// caller moves on to its fallback tool.
pub async fn lsof_find(
    port: u16,
    protocol: Protocol,
    timeout: Duration,
) -> Result<Vec<ProcessInfo>> {
    let selector = format!("-i{}:{}", protocol.as_str().to_uppercase(), port);
    let mut args = vec!["-nP", selector.as_str()];
    if protocol == Protocol::Tcp {
        args.push("-sTCP:LISTEN");
    }

    let output = execute_command("lsof", &args, timeout).await?;
    if !output.success() {
        return Err(output.into_failure());
    }

    Ok(parse_lsof_output(&output.stdout, port, protocol))
}

/// Parse lsof output into ProcessInfo records for `port`.
///
/// Expected lsof output format:
/// ```text
/// COMMAND    PID  USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
/// node     34805  code   19u  IPv6 0x3d8015e195af1f3f      0t0  TCP [::1]:3000 (LISTEN)
/// ```
pub fn parse_lsof_output(output: &str, port: u16, protocol: Protocol) -> Vec<ProcessInfo> {
    let mut records = Vec::new();

    for line in output.lines() {
        let components: Vec<&str> = line.split_whitespace().collect();
        if components.len() < 9 || components[0] == "COMMAND" {
            continue;
        }

        let pid: u32 = match components[1].parse() {
            Ok(p) => p,
            Err(_) => continue,
        };

        // NAME is the last component with a colon that isn't a device ID
        let name_column = components[8..]
            .iter()
            .rev()
            .find(|c| c.contains(':') && !c.starts_with("0x") && !c.starts_with("0t"));
        let Some((_, local_port)) = name_column.and_then(|c| parse_address(c)) else {
            continue;
        };
        if local_port != port {
            continue;
        }

        records.push(
            ProcessInfo::new(pid, decode_escaped(components[0]), port, protocol)
                .with_user(components[2]),
        );
    }

    records
}

/// Fill in `user` and `command` from `ps` for records that lack them.
///
/// Executes: `ps -o pid=,user=,command= -p <pid>[,<pid>...]`
///
/// Lookup failures leave the fields untouched.
pub async fn enrich_from_ps(
    mut records: Vec<ProcessInfo>,
    timeout: Duration,
) -> Vec<ProcessInfo> {
    let mut pids: Vec<u32> = records.iter().map(|r| r.pid).collect();
    pids.sort_unstable();
    pids.dedup();
    if pids.is_empty() {
        return records;
    }

    let pid_list = pids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let args = ["-o", "pid=,user=,command=", "-p", pid_list.as_str()];
    let output = match execute_command("ps", &args, timeout).await {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "ps lookup failed, leaving records unenriched");
            return records;
        }
    };

    let details = parse_ps_output(&output.stdout);
    for record in &mut records {
        if let Some((user, command)) = details.get(&record.pid) {
            if record.user.is_none() {
                record.user = Some(user.clone());
            }
            if record.command.is_none() {
                record.command = Some(command.clone());
            }
        }
    }
    records
}

/// Parse `ps -o pid=,user=,command=` output into PID -> (user, command).
pub fn parse_ps_output(output: &str) -> HashMap<u32, (String, String)> {
    let mut details = HashMap::new();

    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(pid), Some(user)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(pid) = pid.parse::<u32>() else {
            continue;
        };
        let command = parts.collect::<Vec<_>>().join(" ");
        if command.is_empty() {
            continue;
        }
        details.insert(pid, (user.to_string(), truncate_command(&command)));
    }

    details
}

/// Deliver SIGTERM (`force == false`) or SIGKILL to exactly `pid`.
#[cfg(unix)]
pub fn send_signal(pid: u32, force: bool) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    debug!(pid = pid, signal = %signal, "Sending signal to process");

    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(Error::ProcessNotFound {
            pid: Some(pid),
            port: None,
        }),
        Err(Errno::EPERM) => Err(Error::PermissionDenied {
            message: format!("not allowed to send {} to PID {}", signal, pid),
            pid: Some(pid),
            port: None,
        }),
        Err(e) => Err(Error::KillFailed {
            pid,
            signal: Some(signal.to_string()),
            reason: e.desc().to_string(),
        }),
    }
}

#[cfg(not(unix))]
pub fn send_signal(_pid: u32, _force: bool) -> Result<()> {
    Err(Error::UnsupportedPlatform(
        "signals are only available on Unix".to_string(),
    ))
}

/// Check whether `pid` exists using the null signal.
///
/// EPERM means the process exists but belongs to someone else.
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn process_exists(_pid: u32) -> bool {
    false
}

/// A zombie has exited but not been reaped; it no longer holds its sockets.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| parse_proc_state(&stat))
        .is_some_and(|state| state == 'Z')
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Extract the state letter from `/proc/<pid>/stat`.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so the state is read after the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_state(stat: &str) -> Option<char> {
    let after_name = &stat[stat.rfind(')')? + 1..];
    after_name.split_whitespace().next()?.chars().next()
}
