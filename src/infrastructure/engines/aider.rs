//! Aider engine adapter — the universal fallback.
//!
//! Wraps the `aider` CLI, which routes through LiteLLM internally and can
//! therefore call virtually any LLM provider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{get_env, maybe_sandbox, missing_workspace, probe_binary, result_from_subprocess};
use crate::domain::models::{RunnerResult, RunnerTask};
use crate::domain::ports::AgentEngine;
use crate::infrastructure::subprocess::run_subprocess;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

/// Model prefix -> required API key env var.
const MODEL_API_KEY_MAP: &[(&str, &str)] = &[
    ("claude-", "ANTHROPIC_API_KEY"),
    ("gpt-", "OPENAI_API_KEY"),
    ("o1-", "OPENAI_API_KEY"),
    ("o3", "OPENAI_API_KEY"),
    ("gemini-", "GEMINI_API_KEY"),
    ("deepseek/", "DEEPSEEK_API_KEY"),
    ("deepseek-", "DEEPSEEK_API_KEY"),
    ("moonshot/", "MOONSHOT_API_KEY"),
    ("openrouter/", "OPENROUTER_API_KEY"),
];

/// Wraps the `aider` CLI for universal model support.
///
/// Injects exactly the API key the chosen model's provider requires,
/// resolved by model-name prefix.
#[derive(Debug)]
pub struct AiderAdapter;

#[async_trait]
impl AgentEngine for AiderAdapter {
    fn name(&self) -> &'static str {
        "aider"
    }

    fn supported_models(&self) -> &[&str] {
        // Any LiteLLM-supported model.
        &["*"]
    }

    async fn run(&self, task: &RunnerTask, cancel: &CancellationToken) -> RunnerResult {
        let model = task.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let cmd = vec![
            "aider".to_string(),
            "--yes-always".to_string(),
            "--no-auto-commits".to_string(),
            "--no-git".to_string(),
            "--model".to_string(),
            model.clone(),
            "--message".to_string(),
            task.description.clone(),
        ];

        let mut env: HashMap<String, String> = task.env_vars.clone();
        let lower = model.to_lowercase();
        for (prefix, env_key) in MODEL_API_KEY_MAP {
            if lower.starts_with(prefix) {
                let value = get_env(env_key);
                if !value.is_empty() {
                    env.insert((*env_key).to_string(), value);
                }
                break;
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

        let cost_usd = parse_aider_cost(&sub.stdout);
        result_from_subprocess(task, self.name(), &model, &sub, cost_usd, 0)
    }

    async fn check_available(&self) -> bool {
        probe_binary("aider").await
    }
}

/// Extract cost from aider's output.
///
/// Aider sometimes prints summaries like
/// `Tokens: 12.3k sent, 4.5k received. Cost: $0.05`.
fn parse_aider_cost(stdout: &str) -> f64 {
    let Some(pos) = stdout.find("Cost: $") else {
        return 0.0;
    };
    let number: String = stdout[pos + "Cost: $".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().unwrap_or(0.0)
}
