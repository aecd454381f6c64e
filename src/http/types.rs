//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::models::{
    Complexity, RiskTier, RunnerResult, RunnerTask, TaskStatus, DEFAULT_MAX_TURNS,
    DEFAULT_SANDBOX_IMAGE, DEFAULT_TIMEOUT_SECONDS,
};

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_risk_tier() -> String {
    "medium".to_string()
}

fn default_complexity() -> String {
    "standard".to_string()
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_sandbox_image() -> String {
    DEFAULT_SANDBOX_IMAGE.to_string()
}

/// HTTP request body for submitting a task.
///
/// Risk tier and complexity are validated leniently at the boundary:
/// unknown values fall back to their defaults rather than rejecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub repo_url: String,
    pub branch: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub title: String,
    pub description: String,
    #[serde(default = "default_risk_tier")]
    pub risk_tier: String,
    #[serde(default = "default_complexity")]
    pub complexity: String,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    #[serde(default)]
    pub constitution: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub max_cost_usd: f64,
    #[serde(default)]
    pub sandbox_mode: bool,
    #[serde(default = "default_sandbox_image")]
    pub sandbox_image: String,
}

impl TaskRequest {
    /// Split into the immutable task and the push credential, which is kept
    /// out of the stored task so it never shows up in status responses.
    pub fn into_task(self) -> (RunnerTask, Option<String>) {
        let task = RunnerTask {
            task_id: self.task_id,
            repo_url: self.repo_url,
            branch: self.branch,
            base_branch: self.base_branch,
            title: self.title,
            description: self.description,
            risk_tier: RiskTier::parse_or_default(&self.risk_tier),
            complexity: Complexity::parse_or_default(&self.complexity),
            engine: self.engine,
            model: self.model,
            max_turns: self.max_turns,
            timeout_seconds: self.timeout_seconds,
            env_vars: self.env_vars,
            constitution: self.constitution,
            callback_url: self.callback_url,
            max_cost_usd: self.max_cost_usd,
            sandbox_mode: self.sandbox_mode,
            sandbox_image: self.sandbox_image,
            workspace_path: None,
        };
        (task, self.github_token)
    }
}

/// HTTP response for task status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TaskResponse {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self::bare(task_id, TaskStatus::Pending)
    }

    pub fn bare(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            status: status.as_str().to_string(),
            engine: None,
            model: None,
            files_changed: Vec::new(),
            cost_usd: 0.0,
            num_turns: 0,
            duration_ms: 0,
            commit_sha: None,
            error_message: None,
        }
    }

    pub fn with_result(task_id: impl Into<String>, status: TaskStatus, result: &RunnerResult) -> Self {
        Self {
            task_id: task_id.into(),
            status: status.as_str().to_string(),
            engine: Some(result.engine.clone()),
            model: Some(result.model.clone()),
            files_changed: result.files_changed.clone(),
            cost_usd: result.cost_usd,
            num_turns: result.num_turns,
            duration_ms: result.duration_ms,
            commit_sha: result.commit_sha.clone(),
            error_message: result.error_message.clone(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_tasks: usize,
    pub version: String,
}

/// JSON error body for all non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
