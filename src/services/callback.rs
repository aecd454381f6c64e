//! Best-effort completion callbacks to the orchestrator.
//!
//! When a task carries a `callback_url`, the runner POSTs the terminal
//! result there as JSON. Callback failures are logged and never affect the
//! task outcome.

use serde_json::json;
use std::time::Duration;

use crate::domain::models::{RunnerResult, TaskStatus};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Thin reqwest wrapper for lifecycle callbacks.
#[derive(Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
}

impl Default for CallbackNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// POST a terminal lifecycle event. Errors are swallowed after logging.
    pub async fn notify_terminal(&self, url: &str, status: TaskStatus, result: &RunnerResult) {
        let body = json!({
            "task_id": result.task_id,
            "status": status.as_str(),
            "engine": result.engine,
            "model": result.model,
            "files_changed": result.files_changed,
            "cost_usd": result.cost_usd,
            "num_turns": result.num_turns,
            "duration_ms": result.duration_ms,
            "commit_sha": result.commit_sha,
            "error_message": result.error_message,
        });

        let outcome = self
            .client
            .post(url)
            .timeout(CALLBACK_TIMEOUT)
            .json(&body)
            .send()
            .await;

        match outcome {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(task_id = %result.task_id, url, "task.callback.sent");
            }
            Ok(response) => {
                tracing::warn!(
                    task_id = %result.task_id,
                    url,
                    status = %response.status(),
                    "task.callback.rejected"
                );
            }
            Err(err) => {
                tracing::warn!(task_id = %result.task_id, url, error = %err, "task.callback.failed");
            }
        }
    }
}
