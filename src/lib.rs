//! LailaTov Agent Runner
//!
//! A long-running HTTP service that executes coding-agent tasks:
//! - isolated git workspaces with shallow clones, one per task
//! - engine adapters wrapping external CLIs as supervised subprocesses
//! - per-engine circuit breaking and per-task cost budgets
//! - cooperative cancellation with a hard-kill watchdog
//! - an append-only audit trail for every lifecycle transition

pub mod domain;
pub mod http;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::{ResultStatus, RunnerResult, RunnerTask, TaskStatus};
pub use services::executor::RunnerContext;
