//! In-memory task store.
//!
//! Maps task id to its mutable runtime state. Tasks are stored until
//! process exit so clients can keep polling after the terminal transition.
//! Mutations to a single task serialise through its per-entry lock; the
//! outer map lock is only held to look entries up.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::models::{RunnerTask, TaskState, TaskStatus};

/// Shared handle to one task's mutable state.
pub type SharedTaskState = Arc<RwLock<TaskState>>;

/// Process-wide mapping of task id -> task state.
#[derive(Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<String, SharedTaskState>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new task unless the id is already present.
    ///
    /// Returns the freshly created state, or `None` when the id exists.
    pub async fn create_if_absent(&self, task: RunnerTask) -> Option<SharedTaskState> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.task_id) {
            return None;
        }
        let state = Arc::new(RwLock::new(TaskState::new(task.clone())));
        tasks.insert(task.task_id, state.clone());
        Some(state)
    }

    pub async fn get(&self, task_id: &str) -> Option<SharedTaskState> {
        let tasks = self.tasks.read().await;
        tasks.get(task_id).cloned()
    }

    pub async fn remove(&self, task_id: &str) -> Option<SharedTaskState> {
        let mut tasks = self.tasks.write().await;
        tasks.remove(task_id)
    }

    /// Number of tasks currently running or committing.
    pub async fn count_active(&self) -> usize {
        let snapshot = self.snapshot().await;
        let statuses = join_all(
            snapshot
                .iter()
                .map(|(_, state)| async { state.read().await.status }),
        )
        .await;
        statuses
            .into_iter()
            .filter(|status| matches!(status, TaskStatus::Running | TaskStatus::Committing))
            .count()
    }

    /// Point-in-time copy of all entries, for the watchdog scan.
    pub async fn snapshot(&self) -> Vec<(String, SharedTaskState)> {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    /// Drop every entry. Used on shutdown and for test isolation.
    pub async fn clear(&self) {
        self.tasks.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Complexity, RiskTier, DEFAULT_SANDBOX_IMAGE};
    use std::collections::HashMap as StdHashMap;

    fn task(id: &str) -> RunnerTask {
        RunnerTask {
            task_id: id.to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
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
            env_vars: StdHashMap::new(),
            constitution: String::new(),
            callback_url: None,
            max_cost_usd: 0.0,
            sandbox_mode: false,
            sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
            workspace_path: None,
        }
    }

    #[tokio::test]
    async fn test_create_if_absent() {
        let store = TaskStore::new();
        assert!(store.create_if_absent(task("t1")).await.is_some());
        assert!(store.create_if_absent(task("t1")).await.is_none());
        assert!(store.get("t1").await.is_some());
        assert!(store.get("t2").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_submit_does_not_alter_state() {
        let store = TaskStore::new();
        let state = store.create_if_absent(task("t1")).await.unwrap();
        state.write().await.set_status(TaskStatus::Running);

        assert!(store.create_if_absent(task("t1")).await.is_none());
        let current = store.get("t1").await.unwrap();
        assert_eq!(current.read().await.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_count_active() {
        let store = TaskStore::new();
        let s1 = store.create_if_absent(task("t1")).await.unwrap();
        let s2 = store.create_if_absent(task("t2")).await.unwrap();
        store.create_if_absent(task("t3")).await.unwrap();

        assert_eq!(store.count_active().await, 0);
        s1.write().await.set_status(TaskStatus::Running);
        {
            let mut state = s2.write().await;
            state.set_status(TaskStatus::Running);
            state.set_status(TaskStatus::Committing);
        }
        assert_eq!(store.count_active().await, 2);
    }

    #[tokio::test]
    async fn test_snapshot_and_remove() {
        let store = TaskStore::new();
        store.create_if_absent(task("t1")).await.unwrap();
        store.create_if_absent(task("t2")).await.unwrap();
        assert_eq!(store.snapshot().await.len(), 2);

        store.remove("t1").await;
        assert_eq!(store.snapshot().await.len(), 1);
        store.clear().await;
        assert!(store.snapshot().await.is_empty());
    }
}
