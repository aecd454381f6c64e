//! Domain models for the agent runner.

pub mod result;
pub mod task;

pub use result::{ResultStatus, RunnerResult};
pub use task::{
    generate_task_id, Complexity, RiskTier, RunnerTask, TaskState, TaskStatus,
    DEFAULT_MAX_TURNS, DEFAULT_SANDBOX_IMAGE, DEFAULT_TIMEOUT_SECONDS,
};
