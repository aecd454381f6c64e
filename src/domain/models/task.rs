//! Task model for the agent runner.
//!
//! [`RunnerTask`] is the immutable request as accepted over HTTP;
//! [`TaskState`] is the mutable runtime record tracked in the store while a
//! background worker drives the task through its lifecycle.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::result::RunnerResult;
use crate::domain::error::RunnerError;

/// Default turn limit applied when a request omits `max_turns`.
pub const DEFAULT_MAX_TURNS: u32 = 40;

/// Default soft timeout applied when a request omits `timeout_seconds`.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3600;

/// Default docker image for sandboxed execution.
pub const DEFAULT_SANDBOX_IMAGE: &str = "lailatov/sandbox:python";

/// Lifecycle states of an agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, worker not yet past startup.
    Pending,
    /// Workspace prepared / engine executing.
    Running,
    /// Engine succeeded; git commit and push in progress.
    Committing,
    /// Terminal: engine succeeded and the workspace was committed.
    Complete,
    /// Terminal: any error during the pipeline.
    Failed,
    /// Terminal: cancellation observed.
    Cancelled,
    /// Terminal: the engine exceeded its soft timeout.
    TimedOut,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Committing => "committing",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// True for states with no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }

    /// True iff the state machine permits `self -> next`.
    ///
    /// ```text
    /// pending -> running | cancelled
    /// running -> committing | failed | cancelled | timed_out
    /// committing -> complete | failed | cancelled
    /// ```
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => matches!(
                next,
                Self::Committing | Self::Failed | Self::Cancelled | Self::TimedOut
            ),
            Self::Committing => {
                matches!(next, Self::Complete | Self::Failed | Self::Cancelled)
            }
            Self::Complete | Self::Failed | Self::Cancelled | Self::TimedOut => false,
        }
    }
}

/// Risk classification from triage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskTier {
    /// Lenient parse used at the HTTP boundary: unknown values fall back to
    /// the default tier rather than rejecting the request.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

/// Complexity classification from triage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Standard,
    High,
}

impl Complexity {
    /// Lenient parse used at the HTTP boundary.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "high" => Self::High,
            _ => Self::Standard,
        }
    }
}

/// A task to be executed by the agent runner.
///
/// Created once from the orchestrator request and never mutated during
/// execution; the executor clones it with `workspace_path` filled in before
/// handing it to an engine adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerTask {
    /// Unique identifier (e.g. `gh-42`, `cu-abc123`).
    pub task_id: String,
    /// Git clone URL (https).
    pub repo_url: String,
    /// Branch to create for agent work.
    pub branch: String,
    /// Branch to diff against (usually `main`).
    pub base_branch: String,
    /// Human-readable task title.
    pub title: String,
    /// Full task description / prompt for the agent.
    pub description: String,
    /// Risk classification from triage.
    pub risk_tier: RiskTier,
    /// Complexity classification from triage.
    pub complexity: Complexity,
    /// Engine override (`None` = auto-select from model).
    pub engine: Option<String>,
    /// Model to use (`None` = engine default).
    pub model: Option<String>,
    /// Maximum agent turns before stopping.
    pub max_turns: u32,
    /// Soft timeout for the engine subprocess.
    pub timeout_seconds: u64,
    /// Additional env vars to inject into the engine process.
    pub env_vars: HashMap<String, String>,
    /// Guidance text (CLAUDE.md contents or similar).
    pub constitution: String,
    /// URL to POST the result to when terminal.
    pub callback_url: Option<String>,
    /// Cost ceiling in USD (0.0 = unlimited).
    pub max_cost_usd: f64,
    /// Run the engine inside a docker sandbox.
    pub sandbox_mode: bool,
    /// Docker image for sandbox execution.
    pub sandbox_image: String,
    /// Local checkout path; set by the executor once the workspace exists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub workspace_path: Option<PathBuf>,
}

impl RunnerTask {
    /// Validate the fields that must hold before a task enters the pipeline.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.task_id.is_empty() {
            return Err(RunnerError::InvalidTask("task_id is required".into()));
        }
        if !self
            .task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RunnerError::InvalidTask(format!(
                "task_id '{}' contains characters outside [A-Za-z0-9_-]",
                self.task_id
            )));
        }
        if self.repo_url.is_empty() {
            return Err(RunnerError::InvalidTask("repo_url is required".into()));
        }
        if self.branch.is_empty() {
            return Err(RunnerError::InvalidTask("branch is required".into()));
        }
        if self.description.is_empty() {
            return Err(RunnerError::InvalidTask("description is required".into()));
        }
        if self.max_turns == 0 {
            return Err(RunnerError::InvalidTask("max_turns must be positive".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(RunnerError::InvalidTask(
                "timeout_seconds must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Generate a unique task id.
pub fn generate_task_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("run-{}", &hex[..12])
}

/// Mutable runtime state for a task being executed.
///
/// Unlike [`RunnerTask`] and [`RunnerResult`], this tracks the evolving
/// status during execution. Mutations go through the per-entry lock held by
/// the task store.
pub struct TaskState {
    /// The immutable task definition.
    pub task: RunnerTask,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Terminal result; populated exactly when `status` is terminal.
    pub result: Option<RunnerResult>,
    /// Workspace directory for this task, once created.
    pub workspace_path: Option<PathBuf>,
    /// Sticky cancellation signal observed at every I/O boundary.
    pub cancel: CancellationToken,
    /// Handle to the background worker driving the pipeline.
    pub worker: Option<JoinHandle<()>>,
    /// Monotonic timestamp of the pending -> running transition.
    pub started_at: Option<Instant>,
}

impl TaskState {
    pub fn new(task: RunnerTask) -> Self {
        Self {
            task,
            status: TaskStatus::Pending,
            result: None,
            workspace_path: None,
            cancel: CancellationToken::new(),
            worker: None,
            started_at: None,
        }
    }

    /// Advance the status, refusing transitions the state machine forbids.
    ///
    /// Returns `true` when the transition was applied. A refused transition
    /// is logged and leaves the state untouched; the status never regresses
    /// and never leaves a terminal state.
    pub fn set_status(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                task_id = %self.task.task_id,
                from = self.status.as_str(),
                to = next.as_str(),
                "refused illegal status transition"
            );
            return false;
        }
        if next == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.status = next;
        true
    }
}
