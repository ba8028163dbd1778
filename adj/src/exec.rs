//! Shell command execution with timeouts and cleanup
//!
//! Every shell invocation in the daemon goes through [`ShellRunner`]: the
//! bash-shortcut tier, the simple-task agent, and scheduled-task commands.
//! A command that outlives its timeout gets SIGTERM, a short grace period,
//! then SIGKILL, and is reported as exit code 124 with a timeout marker in
//! stderr. Children are never leaked.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code reported for a timed-out command, matching `timeout(1)`
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Grace period between SIGTERM and SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Errors spawning a shell command
///
/// Execution failures (nonzero exit, timeout) are not errors; they are
/// reported inside [`ShellResult`] because callers need the partial output.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Structured result of one shell command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub working_directory: String,
    pub success: bool,
    pub duration_ms: u64,
}

impl ShellResult {
    /// The user-facing answer for an early-exit route: trimmed stdout on
    /// success, stderr-prefixed error text on failure with stderr.
    pub fn answer(&self) -> String {
        if self.success || self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            format!("error: {}", self.stderr.trim())
        }
    }
}

/// Runs shell commands through `sh -c` with a bounded lifetime
#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
    working_directory: PathBuf,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl ShellRunner {
    /// Create a runner with the given per-command timeout and cwd
    pub fn new(timeout: Duration, working_directory: PathBuf) -> Self {
        Self {
            timeout,
            working_directory,
        }
    }

    /// Override the timeout for a derived runner
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            working_directory: self.working_directory.clone(),
        }
    }

    /// Run one command to completion
    pub async fn run(&self, command: &str) -> Result<ShellResult, ExecError> {
        debug!(command, timeout = ?self.timeout, "ShellRunner::run");
        let started = Instant::now();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output_owned()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(command, timeout = ?self.timeout, "Command timed out");
                terminate(&mut child).await;
                return Ok(self.timed_out(command, started));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        Ok(ShellResult {
            command: command.to_string(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            working_directory: self.working_directory.display().to_string(),
            success: output.status.success(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn timed_out(&self, command: &str, started: Instant) -> ShellResult {
        ShellResult {
            command: command.to_string(),
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("[timeout] command exceeded {}s", self.timeout.as_secs()),
            working_directory: self.working_directory.display().to_string(),
            success: false,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Extension for terminating a child gracefully before collecting output
///
/// `wait_with_output` consumes the child, which would prevent the SIGTERM
/// escalation on timeout, so the runner owns the escalation here.
trait ChildExt {
    async fn wait_with_output_owned(&mut self) -> std::io::Result<std::process::Output>;
}

impl ChildExt for tokio::process::Child {
    async fn wait_with_output_owned(&mut self) -> std::io::Result<std::process::Output> {
        use tokio::io::AsyncReadExt;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let Some(mut out) = self.stdout.take() {
            out.read_to_end(&mut stdout).await?;
        }
        if let Some(mut err) = self.stderr.take() {
            err.read_to_end(&mut stderr).await?;
        }

        let status = self.wait().await?;
        Ok(std::process::Output {
            status,
            stdout,
            stderr,
        })
    }
}

/// Terminate a child: SIGTERM, grace period, then SIGKILL
///
/// Used by the runner's drop path indirectly (`kill_on_drop`) and by the
/// daemon when shutting down long-running subprocesses explicitly.
pub async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!(pid, "Child ignored SIGTERM, sending SIGKILL");
    }

    let _ = child.kill().await;
}
