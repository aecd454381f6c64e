//! Mock engine for testing.
//!
//! Registered into the engine registry by tests that drive the executor
//! without any external CLI installed.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{ResultStatus, RunnerResult, RunnerTask};
use crate::domain::ports::AgentEngine;

/// Scripted behaviour for one mock run.
#[derive(Debug, Clone)]
pub struct MockEngineResponse {
    /// Status the mock reports.
    pub status: ResultStatus,
    /// Cost the mock reports.
    pub cost_usd: f64,
    /// Turns the mock reports.
    pub num_turns: u32,
    /// How long the mock "works" before returning.
    pub delay: Duration,
    /// Whether the delay races the cancel signal (a well-behaved engine)
    /// or ignores it (a hung engine, for watchdog tests).
    pub heed_cancel: bool,
    /// File to write into the workspace before returning, as
    /// `(relative path, contents)`.
    pub write_file: Option<(String, String)>,
    /// Error message attached when status is not success.
    pub error_message: Option<String>,
}

impl Default for MockEngineResponse {
    fn default() -> Self {
        Self {
            status: ResultStatus::Success,
            cost_usd: 0.0,
            num_turns: 1,
            delay: Duration::from_millis(0),
            heed_cancel: true,
            write_file: None,
            error_message: None,
        }
    }
}

impl MockEngineResponse {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Failure,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Mock engine with a scripted response and a call log.
#[derive(Debug)]
pub struct MockEngine {
    name: &'static str,
    response: RwLock<MockEngineResponse>,
    calls: RwLock<Vec<String>>,
}

impl MockEngine {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            response: RwLock::new(MockEngineResponse::default()),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn with_response(name: &'static str, response: MockEngineResponse) -> Arc<Self> {
        Arc::new(Self {
            name,
            response: RwLock::new(response),
            calls: RwLock::new(Vec::new()),
        })
    }

    /// Task ids this engine was invoked with, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl AgentEngine for MockEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supported_models(&self) -> &[&str] {
        &["*"]
    }

    async fn run(&self, task: &RunnerTask, cancel: &CancellationToken) -> RunnerResult {
        self.calls.write().await.push(task.task_id.clone());
        let response = self.response.read().await.clone();

        let model = task
            .model
            .clone()
            .unwrap_or_else(|| "mock-model".to_string());

        if response.heed_cancel {
            tokio::select! {
                () = tokio::time::sleep(response.delay) => {}
                () = cancel.cancelled() => {
                    return RunnerResult::cancelled(&task.task_id, self.name, &model);
                }
            }
        } else {
            tokio::time::sleep(response.delay).await;
        }

        if let (Some(workspace), Some((path, contents))) =
            (task.workspace_path.as_ref(), response.write_file.as_ref())
        {
            let _ = tokio::fs::write(workspace.join(path), contents).await;
        }

        let mut result = RunnerResult::new(&task.task_id, response.status, self.name, &model);
        result.cost_usd = response.cost_usd;
        result.num_turns = response.num_turns;
        result.error_message = response.error_message.clone();
        result
    }

    async fn check_available(&self) -> bool {
        true
    }
}
