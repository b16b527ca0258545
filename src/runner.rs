//! Shell command execution against the workspace.
//!
//! Commands run with the workspace root as working directory and the
//! server's own privileges. There is no sandbox: anyone who can reach
//! `/api/execute` can do whatever the server user can. `CommandRunner` is
//! the seam where a restricted implementation would be plugged in.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::error::{AppError, Result};
use crate::events::EventHub;
use crate::models::{BroadcastEvent, CommandResult};

pub const MAX_COMMAND_LEN: usize = 10_000;

/// Per-stream capture cap; output past it is discarded.
const MAX_CAPTURE_BYTES: usize = 16 * 1024 * 1024;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion. Launch failures, nonzero exits and
    /// timeouts are reported in `CommandResult::error`, never as `Err`.
    async fn run(&self, command: &str) -> CommandResult;
}

pub type SharedRunner = Arc<dyn CommandRunner>;

pub struct ShellRunner {
    cwd: PathBuf,
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            cwd: cwd.into(),
            timeout,
        }
    }

    fn shell(&self, command: &str) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };

        cmd.current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Lead a fresh process group so a timeout can take down the
        // whole pipeline, not just the shell.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn append(&self, bytes: &[u8]) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let room = MAX_CAPTURE_BYTES.saturating_sub(buf.len());
        buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn text(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, sink: Capture) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.append(&chunk[..n]),
        }
    }
}

fn exit_error(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("Command failed with exit code {}", code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("Command terminated by signal {}", signal));
        }
    }
    Some("Command failed".to_string())
}

/// The command's process group. Dropping it while armed kills every
/// member, so an abandoned run never leaves background jobs behind. The id
/// is captured at spawn because the shell may already be reaped while its
/// jobs live on.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        // SAFETY: plain syscall; the group id cannot be recycled while any
        // member of the group is still alive.
        unsafe {
            libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }

    /// The run finished on its own; nothing is left to kill.
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn terminate(child: &mut Child, group: &mut ProcessGroup) {
    group.kill();
    let _ = child.kill().await;
}

fn result(command: &str, stdout: String, stderr: String, error: Option<String>) -> CommandResult {
    CommandResult {
        command: command.to_string(),
        stdout,
        stderr,
        error,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> CommandResult {
        let mut child = match self.shell(command).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to launch `{}`: {}", command, e);
                let error = format!("Failed to launch command: {}", e);
                return result(command, String::new(), String::new(), Some(error));
            }
        };

        let mut group = ProcessGroup::new(child.id());
        let stdout = Capture::default();
        let stderr = Capture::default();
        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(out, stdout.clone())));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(err, stderr.clone())));
        }

        // Done means exited and both pipes closed; a background job still
        // holding the pipes counts against the limit.
        let finished = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await;
            for p in pumps.iter_mut() {
                let _ = p.await;
            }
            status
        })
        .await;

        let error = match finished {
            Ok(Ok(status)) => {
                group.disarm();
                exit_error(status)
            }
            Ok(Err(e)) => Some(format!("Failed to wait for command: {}", e)),
            Err(_) => {
                tracing::warn!("Command timed out after {:?}: {}", self.timeout, command);
                terminate(&mut child, &mut group).await;
                for p in &pumps {
                    p.abort();
                }
                Some(format!("Command timed out after {}s", self.timeout.as_secs_f64()))
            }
        };

        result(command, stdout.text(), stderr.text(), error)
    }
}

/// Validate, run, and broadcast exactly one `command_output` event.
pub async fn execute(
    runner: &dyn CommandRunner,
    events: &EventHub,
    command: &str,
) -> Result<CommandResult> {
    if command.trim().is_empty() {
        return Err(AppError::InvalidRequest("No command provided".to_string()));
    }
    if command.len() > MAX_COMMAND_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Command too long (max {} characters)",
            MAX_COMMAND_LEN
        )));
    }

    tracing::info!("Executing command: {}", command);
    let output = runner.run(command).await;
    if let Some(error) = &output.error {
        tracing::info!("Command `{}` reported: {}", command, error);
    }

    events.publish(BroadcastEvent::CommandOutput {
        output: output.clone(),
    });
    Ok(output)
}
