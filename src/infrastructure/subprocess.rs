//! Subprocess supervision for engine adapters and git plumbing.
//!
//! Launches a child from an argument vector (no shell interpretation),
//! captures stdout/stderr fully into memory, and races child exit against
//! the soft timeout and the task's cancellation signal. Termination
//! escalates SIGTERM -> SIGKILL after a short grace period.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Maximum chars kept from stdout/stderr tails.
pub const OUTPUT_TAIL_LIMIT: usize = 5000;

/// Grace period before escalating SIGTERM to SIGKILL.
const SIGTERM_GRACE: Duration = Duration::from_secs(5);

/// Raw output from a subprocess execution.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    /// Child exit code; -1 when the binary was missing or the child was
    /// killed by a signal.
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl SubprocessResult {
    fn not_found(binary: &str, duration_ms: u64) -> Self {
        Self {
            return_code: -1,
            stdout: String::new(),
            stderr: format!("Command not found: {binary}"),
            duration_ms,
            timed_out: false,
            cancelled: false,
        }
    }
}

/// Run a CLI command as a supervised subprocess.
///
/// Waits simultaneously for three conditions: child exit (normal path),
/// `timeout` elapsed (terminate, grace, kill; marked `timed_out`), and
/// `cancel` firing (same escalation; marked `cancelled`). A missing binary
/// is reported as a result with return code -1, not an error.
pub async fn run_subprocess(
    cmd: &[String],
    cwd: &Path,
    env_overrides: &HashMap<String, String>,
    timeout: Duration,
    stdin_text: Option<&str>,
    cancel: &CancellationToken,
) -> SubprocessResult {
    let start = Instant::now();

    tracing::info!(
        cmd = ?&cmd[..cmd.len().min(3)],
        cwd = %cwd.display(),
        timeout_secs = timeout.as_secs(),
        "subprocess.start"
    );

    let mut command = Command::new(&cmd[0]);
    command
        .args(&cmd[1..])
        .current_dir(cwd)
        .envs(env_overrides)
        .stdin(if stdin_text.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return SubprocessResult::not_found(&cmd[0], start.elapsed().as_millis() as u64);
        }
        Err(err) => {
            return SubprocessResult {
                return_code: -1,
                stdout: String::new(),
                stderr: format!("Failed to spawn {}: {err}", cmd[0]),
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: false,
                cancelled: false,
            };
        }
    };

    if let Some(text) = stdin_text {
        if let Some(mut stdin) = child.stdin.take() {
            // Feed stdin from its own task so a slow reader can't stall the
            // supervisor against a full pipe; dropping the handle closes the
            // pipe and signals end of input.
            let text = text.to_string();
            tokio::spawn(async move {
                let _ = stdin.write_all(text.as_bytes()).await;
            });
        }
    }

    let stdout_task = child.stdout.take().map(drain_stdout);
    let stderr_task = child.stderr.take().map(drain_stderr);

    let mut timed_out = false;
    let mut cancelled = false;

    let exit_status = tokio::select! {
        status = child.wait() => Some(status),
        () = tokio::time::sleep(timeout) => {
            timed_out = true;
            None
        }
        () = cancel.cancelled() => {
            cancelled = true;
            None
        }
    };

    let return_code = match exit_status {
        Some(Ok(status)) => status.code().unwrap_or(-1),
        Some(Err(_)) => -1,
        None => {
            terminate_then_kill(&mut child).await;
            -1
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;

    let (stdout, stderr) = if timed_out {
        abort_readers(stdout_task, stderr_task);
        (
            String::new(),
            "Process killed: timeout exceeded".to_string(),
        )
    } else if cancelled {
        abort_readers(stdout_task, stderr_task);
        (String::new(), "Process cancelled".to_string())
    } else {
        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;
        (stdout, stderr)
    };

    tracing::info!(
        return_code,
        duration_ms,
        timed_out,
        cancelled,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "subprocess.done"
    );

    SubprocessResult {
        return_code,
        stdout,
        stderr,
        duration_ms,
        timed_out,
        cancelled,
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL if still alive.
async fn terminate_then_kill(child: &mut Child) {
    if let Some(pid) = child.id() {
        tracing::info!(pid, "subprocess.terminating");
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    if tokio::time::timeout(SIGTERM_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
    }
}

fn drain_stdout(mut stream: ChildStdout) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf).await;
        buf
    })
}

fn drain_stderr(mut stream: ChildStderr) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(task) => {
            let bytes = task.await.unwrap_or_default();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None => String::new(),
    }
}

fn abort_readers(stdout: Option<JoinHandle<Vec<u8>>>, stderr: Option<JoinHandle<Vec<u8>>>) {
    if let Some(task) = stdout {
        task.abort();
    }
    if let Some(task) = stderr {
        task.abort();
    }
}

/// Return the last `limit` chars of `text`, with a truncation marker when
/// anything was dropped.
pub fn tail(text: &str, limit: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().skip(char_count - limit).collect();
    format!("...truncated...\n{kept}")
}
