//! Claude Code engine adapter.
//!
//! Wraps the `claude` CLI in `--print` mode for headless execution and
//! parses its NDJSON output for cost and turn metrics.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    get_env, maybe_sandbox, missing_workspace, probe_binary, result_from_subprocess,
};
use crate::domain::models::{RunnerResult, RunnerTask};
use crate::domain::ports::AgentEngine;
use crate::infrastructure::subprocess::run_subprocess;

/// Models the `claude` CLI natively supports.
pub const SUPPORTED_MODELS: &[&str] = &[
    "claude-opus-4-6",
    "claude-sonnet-4-6",
    "claude-haiku-4-5",
];

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

/// Wraps the `claude` CLI for headless agent execution.
///
/// Requires the `claude` binary on PATH. Injects `ANTHROPIC_API_KEY` and,
/// when set, `ANTHROPIC_BASE_URL` for gateway routing.
#[derive(Debug)]
pub struct ClaudeCodeAdapter;

#[async_trait]
impl AgentEngine for ClaudeCodeAdapter {
    fn name(&self) -> &'static str {
        "claude-code"
    }

    fn supported_models(&self) -> &[&str] {
        SUPPORTED_MODELS
    }

    async fn run(&self, task: &RunnerTask, cancel: &CancellationToken) -> RunnerResult {
        let model = task.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let cmd = vec![
            "claude".to_string(),
            "--print".to_string(),
            "--model".to_string(),
            model.clone(),
            "--max-turns".to_string(),
            task.max_turns.to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--verbose".to_string(),
        ];

        let mut env: HashMap<String, String> = task.env_vars.clone();
        let api_key = get_env("ANTHROPIC_API_KEY");
        if !api_key.is_empty() {
            env.insert("ANTHROPIC_API_KEY".to_string(), api_key);
        }
        let base_url = get_env("ANTHROPIC_BASE_URL");
        if !base_url.is_empty() {
            env.insert("ANTHROPIC_BASE_URL".to_string(), base_url);
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
            Some(&task.description),
            cancel,
        )
        .await;

        let (cost_usd, num_turns) = parse_claude_output(&sub.stdout);
        result_from_subprocess(task, self.name(), &model, &sub, cost_usd, num_turns)
    }

    async fn check_available(&self) -> bool {
        probe_binary("claude").await
    }
}

/// Extract cost and turn count from claude's JSON output.
///
/// `--output-format json` produces NDJSON; the last parseable line carries
/// the result object with `cost_usd` and `num_turns`. Defaults to (0.0, 0)
/// when nothing parses.
fn parse_claude_output(stdout: &str) -> (f64, u32) {
    for line in stdout.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(data) = serde_json::from_str::<serde_json::Value>(line) {
            let cost = data.get("cost_usd").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            let turns = data
                .get("num_turns")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as u32;
            return (cost, turns);
        }
    }
    (0.0, 0)
}
