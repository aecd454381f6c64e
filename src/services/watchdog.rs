//! External task watchdog.
//!
//! Monitors running tasks and force-kills those that exceed their hard
//! timeout (2x the configured soft timeout). Also detects zombie tasks:
//! status still running but the underlying worker has already finished.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::audit_log::AuditLog;
use super::task_store::{SharedTaskState, TaskStore};
use crate::domain::models::{RunnerResult, TaskStatus};
use crate::infrastructure::workspace;

/// Tasks exceeding `timeout_seconds * HARD_KILL_MULTIPLIER` are forcibly
/// terminated by the watchdog.
pub const HARD_KILL_MULTIPLIER: f64 = 2.0;

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background watchdog over the task store.
pub struct TaskWatchdog {
    store: TaskStore,
    audit: AuditLog,
    check_interval: Duration,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskWatchdog {
    pub fn new(store: TaskStore, audit: AuditLog) -> Self {
        Self::with_interval(store, audit, DEFAULT_CHECK_INTERVAL)
    }

    pub fn with_interval(store: TaskStore, audit: AuditLog, check_interval: Duration) -> Self {
        Self {
            store,
            audit,
            check_interval,
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Start the background scan loop. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("watchdog.already_running");
            return;
        }
        let watchdog = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            watchdog.run_loop().await;
        }));
        tracing::info!(interval_secs = self.check_interval.as_secs_f64(), "watchdog.started");
    }

    /// Stop the watchdog and wait for the loop to exit.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = {
            let mut guard = self.handle.lock().await;
            guard.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("watchdog.stopped");
    }

    /// True while the background loop is active.
    pub async fn is_running(&self) -> bool {
        let handle = self.handle.lock().await;
        handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn run_loop(&self) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.check_interval) => {
                    self.check_tasks().await;
                }
            }
        }
    }

    /// Scan all tasks for overtime or zombie conditions.
    ///
    /// Public so tests can drive a tick directly without waiting out the
    /// interval.
    pub async fn check_tasks(&self) {
        for (task_id, state) in self.store.snapshot().await {
            self.check_overtime(&task_id, &state).await;
            self.check_zombie(&task_id, &state).await;
        }
    }

    async fn check_overtime(&self, task_id: &str, state: &SharedTaskState) {
        let (elapsed, hard_limit) = {
            let guard = state.read().await;
            if guard.status != TaskStatus::Running {
                return;
            }
            let Some(started_at) = guard.started_at else {
                return;
            };
            let hard_limit = guard.task.timeout_seconds as f64 * HARD_KILL_MULTIPLIER;
            (started_at.elapsed().as_secs_f64(), hard_limit)
        };

        if elapsed <= hard_limit {
            return;
        }

        tracing::warn!(
            task_id,
            elapsed_seconds = elapsed,
            hard_limit_seconds = hard_limit,
            "watchdog.force_kill"
        );

        {
            let mut guard = state.write().await;
            // Re-check under the write lock: the worker may have finished
            // between the snapshot and now.
            if guard.status != TaskStatus::Running {
                return;
            }
            guard.cancel.cancel();
            if let Some(worker) = guard.worker.take() {
                worker.abort();
            }
            guard.set_status(TaskStatus::Failed);
            let engine = guard.task.engine.clone().unwrap_or_else(|| "unknown".to_string());
            let model = guard.task.model.clone().unwrap_or_else(|| "unknown".to_string());
            guard.result = Some(RunnerResult::failure(
                task_id,
                engine,
                model,
                format!(
                    "Force-killed by watchdog after {elapsed:.1}s (hard limit {hard_limit:.0}s)"
                ),
            ));
        }

        self.audit
            .record_with(
                "watchdog.force_kill",
                task_id,
                [
                    ("elapsed_seconds".to_string(), json!((elapsed * 10.0).round() / 10.0)),
                    ("hard_limit_seconds".to_string(), json!(hard_limit)),
                ]
                .into_iter()
                .collect(),
            )
            .await;

        if std::env::var("LAILATOV_KEEP_WORKSPACES").unwrap_or_default().is_empty() {
            workspace::cleanup_workspace(task_id).await;
        }
    }

    /// A zombie is a diagnostic signal that the executor has a bug; the
    /// watchdog logs it but does not rewrite status.
    async fn check_zombie(&self, task_id: &str, state: &SharedTaskState) {
        let guard = state.read().await;
        if guard.status != TaskStatus::Running {
            return;
        }
        let Some(worker) = guard.worker.as_ref() else {
            return;
        };
        if worker.is_finished() {
            tracing::warn!(task_id, status = guard.status.as_str(), "watchdog.zombie_detected");
        }
    }
}
