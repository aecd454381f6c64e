//! Gemini CLI engine adapter.
//!
//! Wraps the `gemini` CLI for headless execution with Google models.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{get_env, maybe_sandbox, missing_workspace, probe_binary, result_from_subprocess};
use crate::domain::models::{RunnerResult, RunnerTask};
use crate::domain::ports::AgentEngine;
use crate::infrastructure::subprocess::run_subprocess;

pub const SUPPORTED_MODELS: &[&str] = &["gemini-2.5-pro", "gemini-2.5-flash"];

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Wraps the `gemini` CLI for headless agent execution.
///
/// Requires the `gemini` binary on PATH and `GEMINI_API_KEY` in the
/// environment.
#[derive(Debug)]
pub struct GeminiCliAdapter;

#[async_trait]
impl AgentEngine for GeminiCliAdapter {
    fn name(&self) -> &'static str {
        "gemini-cli"
    }

    fn supported_models(&self) -> &[&str] {
        SUPPORTED_MODELS
    }

    async fn run(&self, task: &RunnerTask, cancel: &CancellationToken) -> RunnerResult {
        let model = task.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let cmd = vec![
            "gemini".to_string(),
            "--model".to_string(),
            model.clone(),
            "--message".to_string(),
            task.description.clone(),
        ];

        let mut env: HashMap<String, String> = task.env_vars.clone();
        let api_key = get_env("GEMINI_API_KEY");
        if !api_key.is_empty() {
            env.insert("GEMINI_API_KEY".to_string(), api_key);
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

        // Gemini CLI does not report cost in its output.
        result_from_subprocess(task, self.name(), &model, &sub, 0.0, 0)
    }

    async fn check_available(&self) -> bool {
        probe_binary("gemini").await
    }
}
