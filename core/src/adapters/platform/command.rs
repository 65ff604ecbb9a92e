//! Subprocess execution with a hard deadline.
//!
//! Every enumeration and kill helper goes through [`execute_command`].
//! A helper that outlives its deadline is asked to exit, then killed
//! after [`HELPER_SHUTDOWN_GRACE`].

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default ceiling for a single helper command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a timed-out helper gets to exit before it is force-killed.
pub const HELPER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Captured result of a finished helper command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Rendered command line, for error messages.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the helper was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convert a non-zero exit into `Error::CommandFailed`.
    pub fn into_failure(self) -> Error {
        let stderr = self.stderr.trim();
        let stderr = if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        };
        Error::CommandFailed {
            command: self.command.clone(),
            exit_code: self.exit_code,
            stderr: stderr.to_string(),
        }
    }
}

/// Run `program args..` to completion or until `timeout` expires.
///
/// Completion and the deadline race in a single `select!`, so exactly one
/// of them decides the outcome. On timeout the helper is shut down and
/// `Error::OperationTimeout` is returned.
pub async fn execute_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput> {
    run_with_deadline(program, args, timeout, HELPER_SHUTDOWN_GRACE).await
}

async fn run_with_deadline(
    program: &str,
    args: &[&str],
    timeout: Duration,
    shutdown_grace: Duration,
) -> Result<CommandOutput> {
    let command_line = render_command(program, args);
    debug!(command = %command_line, "Executing command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(&command_line, e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let completion = async {
        let (status, out, err) = tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
        Ok::<_, std::io::Error>((status?, out?, err?))
    };

    let finished = tokio::select! {
        result = completion => Some(result),
        _ = sleep(timeout) => None,
    };

    match finished {
        Some(result) => {
            let (status, stdout, stderr) = result?;
            let output = CommandOutput {
                command: command_line,
                stdout,
                stderr,
                exit_code: status.code(),
            };
            debug!(
                command = %output.command,
                exit_code = ?output.exit_code,
                "Command finished"
            );
            Ok(output)
        }
        None => {
            warn!(
                command = %command_line,
                timeout_ms = timeout.as_millis() as u64,
                "Command timed out, shutting it down"
            );
            shutdown_helper(&mut child, &command_line, shutdown_grace).await;
            Err(Error::OperationTimeout {
                operation: command_line,
                timeout_ms: timeout.as_millis() as u64,
                port: None,
            })
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Ask the helper to exit, then force-kill it if it lingers.
async fn shutdown_helper(child: &mut Child, command_line: &str, grace: Duration) {
    request_exit(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => debug!(command = %command_line, "Timed-out command exited"),
        Err(_) => {
            warn!(command = %command_line, "Timed-out command ignored termination, killing");
            if let Err(e) = child.kill().await {
                warn!(command = %command_line, error = %e, "Failed to kill timed-out command");
            }
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // id() is None once the child has been reaped.
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(pid = pid, error = %e, "SIGTERM to helper failed");
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Failed to request helper exit");
    }
}

fn spawn_error(command_line: &str, error: std::io::Error) -> Error {
    match error.kind() {
        ErrorKind::NotFound => Error::CommandFailed {
            command: command_line.to_string(),
            exit_code: None,
            stderr: "command not found".to_string(),
        },
        ErrorKind::PermissionDenied => Error::PermissionDenied {
            message: format!("cannot execute {}: {}", command_line, error),
            pid: None,
            port: None,
        },
        _ => Error::CommandFailed {
            command: command_line.to_string(),
            exit_code: None,
            stderr: error.to_string(),
        },
    }
}

fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let script = "echo hello; echo oops >&2; exit 3";
        let output = execute_command("sh", &["-c", script], DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());

        match output.into_failure() {
            Error::CommandFailed { exit_code, stderr, .. } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let result =
            execute_command("definitely-not-a-real-tool-xyz", &[], DEFAULT_COMMAND_TIMEOUT).await;
        match result {
            Err(Error::CommandFailed { exit_code, .. }) => assert_eq!(exit_code, None),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_shuts_down_helper() {
        let started = Instant::now();
        let result = execute_command("sleep", &["10"], Duration::from_millis(100)).await;

        match result {
            Err(Error::OperationTimeout { operation, timeout_ms, .. }) => {
                assert_eq!(operation, "sleep 10");
                assert_eq!(timeout_ms, 100);
            }
            other => panic!("unexpected: {:?}", other),
        }
        // sleep exits on SIGTERM, so the grace window is never used up.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_helper_ignoring_term_is_killed_after_grace() {
        let grace = Duration::from_millis(500);
        let script = "trap '' TERM; while :; do sleep 0.05; done";
        let started = Instant::now();

        let result =
            run_with_deadline("sh", &["-c", script], Duration::from_millis(100), grace).await;

        assert!(matches!(result, Err(Error::OperationTimeout { .. })));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100) + grace, "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
    }

    #[test]
    fn test_render_command() {
        assert_eq!(render_command("lsof", &["-nP", "-iTCP:3000"]), "lsof -nP -iTCP:3000");
    }
}
