//! The task executor — the end-to-end pipeline run once per task.
//!
//! Linear phases, each audited: prepare the workspace, select an engine
//! behind its circuit breaker, run the engine under the subprocess
//! supervisor with a per-task budget, commit and push on success, then
//! finalise. Errors never escape the worker: each converts into a failure
//! result surfaced via polling and the best-effort callback.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::audit_log::AuditLog;
use super::budget_tracker::BudgetTracker;
use super::callback::CallbackNotifier;
use super::circuit_breaker::BreakerRegistry;
use super::task_store::{SharedTaskState, TaskStore};
use crate::domain::error::RunnerError;
use crate::domain::models::{ResultStatus, RunnerResult, RunnerTask, TaskStatus};
use crate::infrastructure::engines::EngineRegistry;
use crate::infrastructure::github_tokens::TokenIssuer;
use crate::infrastructure::workspace;

/// Shared services threaded through the HTTP layer and every task worker.
#[derive(Clone)]
pub struct RunnerContext {
    pub store: TaskStore,
    pub audit: AuditLog,
    pub breakers: BreakerRegistry,
    pub engines: Arc<EngineRegistry>,
    pub callbacks: CallbackNotifier,
    pub tokens: TokenIssuer,
}

impl Default for RunnerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerContext {
    pub fn new() -> Self {
        Self {
            store: TaskStore::new(),
            audit: AuditLog::new(),
            breakers: BreakerRegistry::new(),
            engines: Arc::new(EngineRegistry::new()),
            callbacks: CallbackNotifier::new(),
            tokens: TokenIssuer::new(),
        }
    }
}

/// Execute a task end-to-end: workspace -> engine -> commit -> push.
///
/// Runs as the task's background worker. The cancel signal on the task
/// state is observed at every phase boundary and raced by the subprocess
/// supervisor while the engine runs.
pub async fn execute_task(ctx: RunnerContext, state: SharedTaskState, github_token: Option<String>) {
    let task = { state.read().await.task.clone() };

    let result = run_pipeline(&ctx, &state, &task, github_token).await;
    finalize(&ctx, &state, &task, result).await;

    if std::env::var("LAILATOV_KEEP_WORKSPACES")
        .unwrap_or_default()
        .is_empty()
    {
        workspace::cleanup_workspace(&task.task_id).await;
    }
}

async fn run_pipeline(
    ctx: &RunnerContext,
    state: &SharedTaskState,
    task: &RunnerTask,
    github_token: Option<String>,
) -> RunnerResult {
    let fallback_engine = task.engine.clone().unwrap_or_else(|| "unknown".to_string());
    let fallback_model = task.model.clone().unwrap_or_else(|| "unknown".to_string());
    let cancel = { state.read().await.cancel.clone() };

    // Cancel observed before the worker properly started.
    if cancel.is_cancelled() {
        return RunnerResult::cancelled(&task.task_id, &fallback_engine, &fallback_model);
    }

    // 1. Prepare.
    {
        let mut guard = state.write().await;
        if !guard.set_status(TaskStatus::Running) {
            // The state went terminal under our feet (cancel raced startup).
            return RunnerResult::cancelled(&task.task_id, &fallback_engine, &fallback_model);
        }
    }
    ctx.audit.record("task.started", &task.task_id).await;
    tracing::info!(task_id = %task.task_id, "task.workspace.creating");

    // Use short-lived app-token rotation when no static token was supplied.
    let effective_token = match github_token {
        Some(token) => Some(token),
        None => ctx.tokens.issue().await,
    };

    let repo_path = match workspace::create_workspace(
        &task.task_id,
        &task.repo_url,
        &task.branch,
        &task.base_branch,
        effective_token.as_deref(),
    )
    .await
    {
        Ok(path) => path,
        Err(err) => {
            return RunnerResult::failure(
                &task.task_id,
                &fallback_engine,
                &fallback_model,
                err.to_string(),
            );
        }
    };
    state.write().await.workspace_path = Some(repo_path.clone());

    // 2. Select engine and consult its breaker.
    let engine = match ctx
        .engines
        .select(task.model.as_deref(), task.engine.as_deref())
        .await
    {
        Ok(engine) => engine,
        Err(err) => {
            return RunnerResult::failure(
                &task.task_id,
                &fallback_engine,
                &fallback_model,
                err.to_string(),
            );
        }
    };

    if let Err(err) = ctx.breakers.allow(engine.name()).await {
        ctx.audit
            .record_with(
                "task.circuit_open",
                &task.task_id,
                meta(&[("engine", json!(engine.name()))]),
            )
            .await;
        return RunnerResult::failure(&task.task_id, engine.name(), &fallback_model, err.to_string());
    }

    ctx.audit
        .record_with(
            "task.engine_selected",
            &task.task_id,
            meta(&[("engine", json!(engine.name()))]),
        )
        .await;
    tracing::info!(task_id = %task.task_id, engine = engine.name(), "task.engine.selected");

    // 3. Execute under the supervisor, with a per-task budget.
    let mut task_for_engine = task.clone();
    task_for_engine.workspace_path = Some(repo_path.clone());

    let mut budget = BudgetTracker::new(task.max_cost_usd);
    let mut result = engine.run(&task_for_engine, &cancel).await;

    // 4. Record cost and enforce the ceiling.
    if result.cost_usd > 0.0 {
        budget.record_cost(result.cost_usd);
        if let Err(err) = budget.check() {
            let RunnerError::BudgetExceeded { spent, limit } = &err else {
                unreachable!("budget check only fails with BudgetExceeded");
            };
            ctx.audit
                .record_with(
                    "task.budget_exceeded",
                    &task.task_id,
                    meta(&[("spent", json!(spent)), ("limit", json!(limit))]),
                )
                .await;
            result.status = ResultStatus::Failure;
            result.error_message = Some(err.to_string());
            return result;
        }
    }

    // 5. Update the breaker; timeouts and cancellations leave it untouched.
    match result.status {
        ResultStatus::Success => ctx.breakers.record_success(engine.name()).await,
        ResultStatus::Failure => ctx.breakers.record_failure(engine.name()).await,
        ResultStatus::Timeout | ResultStatus::Cancelled => {}
    }

    // 6. Commit and push on success. The commit phase does not poll the
    // cancel signal; an in-flight commit always completes.
    if result.status == ResultStatus::Success {
        let entered_committing = state.write().await.set_status(TaskStatus::Committing);
        if entered_committing {
            tracing::info!(task_id = %task.task_id, "task.committing");
            let title = if task.title.is_empty() {
                "agent task"
            } else {
                &task.title
            };
            let commit_msg = format!(
                "feat: {title}\n\nTask: {}\nEngine: {}\nModel: {}\n\n\
                 Co-Authored-By: LailaTov Agent <agent@lailatov.dev>",
                task.task_id,
                engine.name(),
                result.model,
            );

            match workspace::commit_changes(&repo_path, &commit_msg).await {
                Ok(sha) => {
                    let files = workspace::list_changed_files(&repo_path, &task.base_branch).await;
                    if let Some(sha) = &sha {
                        let pushed = workspace::push_changes(&repo_path, &task.branch).await;
                        if !pushed {
                            tracing::warn!(task_id = %task.task_id, sha = %sha, "task.push.failed");
                        }
                    }
                    result.commit_sha = sha;
                    result.files_changed = files;
                }
                Err(err) => {
                    result.status = ResultStatus::Failure;
                    result.error_message = Some(err.to_string());
                }
            }
        }
    }

    result
}

/// Record the terminal transition: status, frozen result, the single
/// terminal audit event, and the best-effort callback.
async fn finalize(ctx: &RunnerContext, state: &SharedTaskState, task: &RunnerTask, result: RunnerResult) {
    let final_status = match result.status {
        ResultStatus::Success => TaskStatus::Complete,
        ResultStatus::Failure => TaskStatus::Failed,
        ResultStatus::Timeout => TaskStatus::TimedOut,
        ResultStatus::Cancelled => TaskStatus::Cancelled,
    };

    let (applied, actual_status) = {
        let mut guard = state.write().await;
        let applied = guard.set_status(final_status);
        if guard.result.is_none() {
            guard.result = Some(result.clone());
        }
        (applied, guard.status)
    };

    // Only the party that performed the terminal transition records the
    // terminal event; a watchdog force-kill already recorded its own.
    if applied {
        let action = match final_status {
            TaskStatus::Complete => "task.completed",
            TaskStatus::Cancelled => "task.cancelled",
            TaskStatus::TimedOut => "task.timed_out",
            _ => "task.failed",
        };
        let mut metadata = meta(&[
            ("status", json!(actual_status.as_str())),
            ("cost_usd", json!(result.cost_usd)),
        ]);
        if let Some(error) = &result.error_message {
            metadata.insert("error".to_string(), json!(error));
        }
        ctx.audit.record_with(action, &task.task_id, metadata).await;
        tracing::info!(task_id = %task.task_id, status = actual_status.as_str(), "task.done");
    }

    if let Some(url) = &task.callback_url {
        ctx.callbacks.notify_terminal(url, actual_status, &result).await;
    }
}

fn meta(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Complexity, RiskTier, DEFAULT_SANDBOX_IMAGE};
    use std::collections::HashMap;

    fn task(id: &str) -> RunnerTask {
        RunnerTask {
            task_id: id.to_string(),
            repo_url: "https://invalid.invalid/repo.git".to_string(),
            branch: "b1".to_string(),
            base_branch: "main".to_string(),
            title: String::new(),
            description: "desc".to_string(),
            risk_tier: RiskTier::default(),
            complexity: Complexity::default(),
            engine: None,
            model: None,
            max_turns: 40,
            timeout_seconds: 3600,
            env_vars: HashMap::new(),
            constitution: String::new(),
            callback_url: None,
            max_cost_usd: 0.0,
            sandbox_mode: false,
            sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
            workspace_path: None,
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start_goes_terminal_with_result() {
        let ctx = RunnerContext::new();
        let state = ctx.store.create_if_absent(task("t1")).await.unwrap();
        state.read().await.cancel.cancel();

        execute_task(ctx.clone(), state.clone(), None).await;

        let guard = state.read().await;
        assert_eq!(guard.status, TaskStatus::Cancelled);
        let result = guard.result.as_ref().unwrap();
        assert_eq!(result.status, ResultStatus::Cancelled);
        drop(guard);

        let events = ctx.audit.events_for("t1").await;
        assert_eq!(
            events.iter().filter(|e| e.action == "task.cancelled").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_clone_failure_fails_task() {
        let root = tempfile::tempdir().unwrap();
        let root_path = root.path().to_str().unwrap().to_string();
        temp_env::async_with_vars(
            [("LAILATOV_WORKSPACE_ROOT", Some(root_path.as_str()))],
            async {
                let ctx = RunnerContext::new();
                let state = ctx.store.create_if_absent(task("t2")).await.unwrap();

                execute_task(ctx.clone(), state.clone(), None).await;

                let guard = state.read().await;
                assert_eq!(guard.status, TaskStatus::Failed);
                let result = guard.result.as_ref().unwrap();
                assert!(result
                    .error_message
                    .as_deref()
                    .unwrap()
                    .contains("Workspace error"));
                drop(guard);

                let events = ctx.audit.events_for("t2").await;
                let actions: Vec<_> = events.iter().map(|e| e.action.as_str()).collect();
                assert!(actions.contains(&"task.started"));
                assert!(actions.contains(&"task.failed"));
            },
        )
        .await;
    }
}
