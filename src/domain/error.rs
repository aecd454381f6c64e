//! Error taxonomy for the agent runner.
//!
//! Errors inside the pipeline never escape the worker: the executor converts
//! each of these into a failure result and a terminal audit event. The HTTP
//! layer maps [`RunnerError::InvalidTask`] to 422 at the boundary.

use thiserror::Error;

/// Errors produced by the runner pipeline and its collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunnerError {
    /// A task field failed boundary validation.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Cumulative cost passed the per-task ceiling.
    #[error("Cost budget exceeded: ${spent:.4} spent, ${limit:.4} limit")]
    BudgetExceeded { spent: f64, limit: f64 },

    /// The engine's circuit breaker is open.
    #[error("Circuit open for engine '{engine}'. Retry after {retry_after_seconds:.0}s.")]
    CircuitOpen {
        engine: String,
        retry_after_seconds: f64,
    },

    /// Requested engine is not in the registry.
    #[error("Unknown engine '{0}'")]
    UnknownEngine(String),

    /// Workspace preparation or a git operation failed.
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Short-lived credential issuance failed (non-fatal to the task).
    #[error("Token issuance failed: {0}")]
    TokenIssuance(String),
}
