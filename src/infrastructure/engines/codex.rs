//! Codex engine adapter.
//!
//! Wraps the `codex` CLI for headless execution with OpenAI models.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{get_env, maybe_sandbox, missing_workspace, probe_binary, result_from_subprocess};
use crate::domain::models::{RunnerResult, RunnerTask};
use crate::domain::ports::AgentEngine;
use crate::infrastructure::subprocess::run_subprocess;

pub const SUPPORTED_MODELS: &[&str] = &[
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4.1-nano",
    "o3",
    "o3-mini",
    "o1",
    "o1-mini",
];

pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Wraps the `codex` CLI for headless agent execution.
///
/// Requires the `codex` binary on PATH and `OPENAI_API_KEY` in the
/// environment.
#[derive(Debug)]
pub struct CodexAdapter;

#[async_trait]
impl AgentEngine for CodexAdapter {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn supported_models(&self) -> &[&str] {
        SUPPORTED_MODELS
    }

    async fn run(&self, task: &RunnerTask, cancel: &CancellationToken) -> RunnerResult {
        let model = task.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let cmd = vec![
            "codex".to_string(),
            "--quiet".to_string(),
            "--model".to_string(),
            model.clone(),
            "--message".to_string(),
            task.description.clone(),
        ];

        let mut env: HashMap<String, String> = task.env_vars.clone();
        let api_key = get_env("OPENAI_API_KEY");
        if !api_key.is_empty() {
            env.insert("OPENAI_API_KEY".to_string(), api_key);
        }

        let Some(workspace) = task.workspace_path.clone() else {
            return missing_workspace(task, self.name(), &model);
        };

        let cmd = maybe_sandbox(task, self.name(), cmd, &workspace, &env);

        let sub = run_subprocess(
            &cmd,
            &workspace,
            &env,
            Duration::from_secs(task.timeout_seconds),
            None,
            cancel,
        )
        .await;

        // Codex CLI does not report cost in its output.
        result_from_subprocess(task, self.name(), &model, &sub, 0.0, 0)
    }

    async fn check_available(&self) -> bool {
        probe_binary("codex").await
    }
}
