//! Oh-my-pi engine adapter.
//!
//! Wraps the `omp` CLI. Like aider, oh-my-pi routes to multiple providers
//! through its built-in model registry, so it also works as a polyglot
//! fallback engine.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{get_env, maybe_sandbox, missing_workspace, probe_binary, result_from_subprocess};
use crate::domain::models::{RunnerResult, RunnerTask};
use crate::domain::ports::AgentEngine;
use crate::infrastructure::subprocess::run_subprocess;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

/// Provider keys forwarded to `omp`; it picks whichever its chosen model
/// requires.
const PROVIDER_ENV_KEYS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "OPENROUTER_API_KEY",
    "GROQ_API_KEY",
    "MISTRAL_API_KEY",
];

/// Wraps the `omp` CLI (oh-my-pi) for headless agent execution.
#[derive(Debug)]
pub struct PiAdapter;

#[async_trait]
impl AgentEngine for PiAdapter {
    fn name(&self) -> &'static str {
        "oh-my-pi"
    }

    fn supported_models(&self) -> &[&str] {
        &["*"]
    }

    async fn run(&self, task: &RunnerTask, cancel: &CancellationToken) -> RunnerResult {
        let model = task.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let cmd = vec![
            "omp".to_string(),
            "--no-session".to_string(),
            "--print".to_string(),
            "--model".to_string(),
            model.clone(),
            task.description.clone(),
        ];

        let mut env: HashMap<String, String> = task.env_vars.clone();
        for env_key in PROVIDER_ENV_KEYS {
            let value = get_env(env_key);
            if !value.is_empty() {
                env.insert((*env_key).to_string(), value);
            }
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

        // omp does not report cost in CLI output.
        result_from_subprocess(task, self.name(), &model, &sub, 0.0, 0)
    }

    async fn check_available(&self) -> bool {
        probe_binary("omp").await
    }
}
