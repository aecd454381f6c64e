//! Audit trail for agent task lifecycle events.
//!
//! Records a structured event for every significant action — submit, start,
//! engine selection, commit, cancel, complete, fail — and mirrors each one
//! to a structured log line. Recording is infallible; concurrent appends
//! from many task workers are safe, and readers may observe any prefix of
//! the true sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single audit event, keyed by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Dotted action tag, e.g. `task.started`, `watchdog.force_kill`.
    pub action: String,
    /// Task this event belongs to.
    pub task_id: String,
    /// Wall-clock time of the event.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata attached by the recorder.
    pub metadata: Map<String, JsonValue>,
}

/// In-memory, append-only audit log.
#[derive(Clone, Default)]
pub struct AuditLog {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event with no metadata.
    pub async fn record(&self, action: &str, task_id: &str) {
        self.record_with(action, task_id, Map::new()).await;
    }

    /// Append an event carrying metadata.
    ///
    /// The event is also emitted as a structured log line with all fields.
    pub async fn record_with(&self, action: &str, task_id: &str, metadata: Map<String, JsonValue>) {
        let event = AuditEvent {
            action: action.to_string(),
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            metadata,
        };
        tracing::info!(
            action = %event.action,
            task_id = %event.task_id,
            metadata = %JsonValue::Object(event.metadata.clone()),
            "audit"
        );
        let mut events = self.events.write().await;
        events.push(event);
    }

    /// Snapshot of all events for one task, in append order.
    pub async fn events_for(&self, task_id: &str) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Total number of recorded events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// True when no events have been recorded.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Drop all events. Used for test isolation and shutdown.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, JsonValue)]) -> Map<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_record_and_query() {
        let log = AuditLog::new();
        log.record("task.submitted", "t1").await;
        log.record_with("task.started", "t1", meta(&[("engine", json!("aider"))]))
            .await;
        log.record("task.submitted", "t2").await;

        let events = log.events_for("t1").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "task.submitted");
        assert_eq!(events[1].action, "task.started");
        assert_eq!(events[1].metadata.get("engine"), Some(&json!("aider")));
    }

    #[tokio::test]
    async fn test_events_in_append_order() {
        let log = AuditLog::new();
        for i in 0..5 {
            log.record(&format!("step.{i}"), "t1").await;
        }
        let events = log.events_for("t1").await;
        let actions: Vec<_> = events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["step.0", "step.1", "step.2", "step.3", "step.4"]);
    }

    #[test]
    fn test_clear() {
        tokio_test::block_on(async {
            let log = AuditLog::new();
            log.record("task.submitted", "t1").await;
            assert_eq!(log.len().await, 1);
            log.clear().await;
            assert!(log.is_empty().await);
        });
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let log = AuditLog::new();
        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.record("task.started", &format!("t{i}")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(log.len().await, 20);
    }
}
