//! Engine adapter implementations.
//!
//! One module per external CLI, plus the registry that selects among them
//! and a mock engine for tests.

pub mod aider;
pub mod claude_code;
pub mod codex;
pub mod gemini_cli;
pub mod mock;
pub mod pi;
pub mod registry;

pub use aider::AiderAdapter;
pub use claude_code::ClaudeCodeAdapter;
pub use codex::CodexAdapter;
pub use gemini_cli::GeminiCliAdapter;
pub use mock::{MockEngine, MockEngineResponse};
pub use pi::PiAdapter;
pub use registry::{derive_provider_from_model, EngineRegistry, MODEL_AFFINITY};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{ResultStatus, RunnerResult, RunnerTask};
use crate::infrastructure::subprocess::{run_subprocess, tail, SubprocessResult, OUTPUT_TAIL_LIMIT};

/// Read an env var at call time; empty string when unset.
pub(crate) fn get_env(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

/// Map a supervisor result onto a populated [`RunnerResult`].
///
/// Success iff return code 0 and neither timed out nor cancelled. Terminal
/// results carry output tails, never full output.
pub(crate) fn result_from_subprocess(
    task: &RunnerTask,
    engine: &'static str,
    model: &str,
    sub: &SubprocessResult,
    cost_usd: f64,
    num_turns: u32,
) -> RunnerResult {
    let status = if sub.cancelled {
        ResultStatus::Cancelled
    } else if sub.timed_out {
        ResultStatus::Timeout
    } else if sub.return_code == 0 {
        ResultStatus::Success
    } else {
        ResultStatus::Failure
    };

    let mut result = RunnerResult::new(&task.task_id, status, engine, model);
    result.cost_usd = cost_usd;
    result.num_turns = num_turns;
    result.duration_ms = sub.duration_ms;
    result.stdout_tail = tail(&sub.stdout, OUTPUT_TAIL_LIMIT);
    result.stderr_tail = tail(&sub.stderr, OUTPUT_TAIL_LIMIT);
    result.error_message = match status {
        ResultStatus::Success => None,
        ResultStatus::Failure => Some(tail(&sub.stderr, OUTPUT_TAIL_LIMIT)),
        ResultStatus::Timeout => Some(format!(
            "Engine timed out after {}s",
            task.timeout_seconds
        )),
        ResultStatus::Cancelled => Some("Task was cancelled".to_string()),
    };
    result
}

/// Failure result for a task that reached an adapter without a workspace.
pub(crate) fn missing_workspace(task: &RunnerTask, engine: &'static str, model: &str) -> RunnerResult {
    RunnerResult::failure(&task.task_id, engine, model, "No workspace path set on task")
}

/// Check that a CLI binary responds to `--version`.
pub(crate) async fn probe_binary(binary: &str) -> bool {
    let cmd = vec![binary.to_string(), "--version".to_string()];
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let result = run_subprocess(
        &cmd,
        &cwd,
        &std::collections::HashMap::new(),
        Duration::from_secs(10),
        None,
        &CancellationToken::new(),
    )
    .await;
    result.return_code == 0
}

/// Wrap the command in the task's docker sandbox when requested.
pub(crate) fn maybe_sandbox(
    task: &RunnerTask,
    engine: &'static str,
    cmd: Vec<String>,
    workspace: &Path,
    env: &std::collections::HashMap<String, String>,
) -> Vec<String> {
    if !task.sandbox_mode {
        return cmd;
    }
    let config = crate::infrastructure::sandbox::SandboxConfig::new(&task.sandbox_image);
    tracing::info!(engine, image = %task.sandbox_image, "engine.sandbox.enabled");
    crate::infrastructure::sandbox::build_docker_cmd(
        &config,
        &cmd,
        &workspace.display().to_string(),
        env,
    )
}
