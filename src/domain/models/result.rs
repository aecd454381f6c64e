//! Structured output from an agent task execution.

use serde::{Deserialize, Serialize};

/// Terminal status reported by an engine adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Engine exited zero without timing out or being cancelled.
    Success,
    /// Engine exited non-zero, or the pipeline failed around it.
    Failure,
    /// Engine exceeded its soft timeout.
    Timeout,
    /// Cancellation was observed while the engine ran.
    Cancelled,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Immutable outcome of a task; frozen once recorded on the task state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResult {
    /// Matches the input task.
    pub task_id: String,
    /// Terminal status of the execution.
    pub status: ResultStatus,
    /// Engine that actually ran.
    pub engine: String,
    /// Model that actually ran.
    pub model: String,
    /// File paths modified by the agent (relative to the repo root).
    pub files_changed: Vec<String>,
    /// Total LLM API cost (0.0 if unavailable).
    pub cost_usd: f64,
    /// Number of agent turns completed (0 if unavailable).
    pub num_turns: u32,
    /// Wall-clock execution time.
    pub duration_ms: u64,
    /// Commit SHA of the agent's work (`None` if nothing was committed).
    pub commit_sha: Option<String>,
    /// Error details when `status` is not success.
    pub error_message: Option<String>,
    /// Last N chars of stdout for debugging.
    pub stdout_tail: String,
    /// Last N chars of stderr for debugging.
    pub stderr_tail: String,
}

impl RunnerResult {
    /// A result with only identity fields set; the usual starting point.
    pub fn new(task_id: impl Into<String>, status: ResultStatus, engine: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            engine: engine.into(),
            model: model.into(),
            files_changed: Vec::new(),
            cost_usd: 0.0,
            num_turns: 0,
            duration_ms: 0,
            commit_sha: None,
            error_message: None,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
        }
    }

    /// Shorthand for an immediate failure with a diagnostic message.
    pub fn failure(
        task_id: impl Into<String>,
        engine: impl Into<String>,
        model: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(task_id, ResultStatus::Failure, engine, model);
        result.error_message = Some(error.into());
        result
    }

    /// Shorthand for a cancelled result.
    pub fn cancelled(
        task_id: impl Into<String>,
        engine: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(task_id, ResultStatus::Cancelled, engine, model);
        result.error_message = Some("Task was cancelled".to_string());
        result
    }
}
