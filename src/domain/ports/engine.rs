//! The engine port — the contract every engine adapter must implement.
//!
//! Adapters wrap external coding-agent CLIs (claude, codex, gemini, aider,
//! omp) as subprocesses and translate their output into a [`RunnerResult`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{RunnerResult, RunnerTask};

/// Interface every engine adapter must satisfy.
#[async_trait]
pub trait AgentEngine: Send + Sync + std::fmt::Debug {
    /// Engine identifier (e.g. `claude-code`, `aider`, `oh-my-pi`).
    fn name(&self) -> &'static str;

    /// Model identifiers this engine natively supports.
    ///
    /// `["*"]` for engines that route to arbitrary providers through their
    /// own model registry.
    fn supported_models(&self) -> &[&str];

    /// Execute the task and return structured results.
    ///
    /// The adapter:
    /// 1. builds the CLI argument vector from task fields,
    /// 2. runs it as a subprocess in `task.workspace_path`,
    /// 3. parses stdout/stderr into [`RunnerResult`] fields,
    /// 4. respects `task.timeout_seconds`, and
    /// 5. races `cancel` for early termination.
    ///
    /// A task without a workspace path is a programmer error and yields an
    /// immediate failure result rather than a panic.
    async fn run(&self, task: &RunnerTask, cancel: &CancellationToken) -> RunnerResult;

    /// True if the engine CLI binary is installed and accessible.
    async fn check_available(&self) -> bool;
}
