//! Execution context store.
//!
//! Holds one [`ExecutionRecord`] per run, keyed by execution id. The store
//! belongs to an orchestrator instance; separate orchestrators never share
//! state. Finished runs stay queryable until evicted.

mod record;

pub use record::{ExecutionRecord, ExecutionStatusView};

use crate::model::{ExecutionStatus, StepResult};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Concurrent map of live and recently finished runs.
#[derive(Debug)]
pub struct ExecutionContextStore {
    records: DashMap<String, Arc<ExecutionRecord>>,
    retention: Duration,
}

impl Default for ExecutionContextStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl ExecutionContextStore {
    /// Creates a store that keeps finished runs for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            records: DashMap::new(),
            retention,
        }
    }

    /// Retention period for finished runs.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Registers a record, replacing any record with the same id.
    pub fn create(&self, record: ExecutionRecord) -> Arc<ExecutionRecord> {
        let record = Arc::new(record);
        self.records
            .insert(record.execution_id().to_string(), Arc::clone(&record));
        debug!(execution_id = %record.execution_id(), "Execution record created");
        record
    }

    /// Looks up a record.
    #[must_use]
    pub fn get(&self, execution_id: &str) -> Option<Arc<ExecutionRecord>> {
        self.records.get(execution_id).map(|r| Arc::clone(r.value()))
    }

    /// Validated status transition. False for unknown ids and illegal moves.
    pub fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> bool {
        self.get(execution_id)
            .is_some_and(|record| record.transition_to(status))
    }

    /// Stores a step result. False for unknown ids.
    pub fn record_step_result(&self, execution_id: &str, result: StepResult) -> bool {
        self.get(execution_id).is_some_and(|record| {
            record.record_step_result(result);
            true
        })
    }

    /// Sets a context variable. False for unknown ids.
    pub fn set_context_variable(&self, execution_id: &str, name: &str, value: Value) -> bool {
        self.get(execution_id).is_some_and(|record| {
            record.set_context_variable(name, value);
            true
        })
    }

    /// Status projection; `None` for unknown or evicted ids.
    #[must_use]
    pub fn status(&self, execution_id: &str) -> Option<ExecutionStatusView> {
        self.get(execution_id).map(|record| record.status_view())
    }

    /// Removes a record. Returns true if it existed.
    pub fn remove(&self, execution_id: &str) -> bool {
        self.records.remove(execution_id).is_some()
    }

    /// Removes settled runs older than the retention period. Returns how
    /// many were evicted. A cancelled run settles when its terminal event
    /// is emitted, not when it is cancelled.
    pub fn evict_expired(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| {
            record
                .finished_for()
                .map_or(true, |age| age < self.retention)
        });
        let evicted = before.saturating_sub(self.records.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired execution records");
        }
        evicted
    }

    /// Ids of all stored runs, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of stored runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no runs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventType, NoOpEventSink};
    use crate::model::{FlowDefinition, StepDefinition};
    use crate::trigger::TriggerRuntimeContext;
    use serde_json::json;

    fn record(id: &str) -> ExecutionRecord {
        let flow = FlowDefinition::new("Acme:Flow").with_step(StepDefinition::new("a", "X"));
        ExecutionRecord::new(id, flow, json!({}), TriggerRuntimeContext::new(None, &json!({})))
    }

    #[test]
    fn test_create_get_remove() {
        let store = ExecutionContextStore::default();
        store.create(record("e1"));
        store.create(record("e2"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.ids(), vec!["e1".to_string(), "e2".to_string()]);
        assert!(store.get("e1").is_some());
        assert!(store.remove("e1"));
        assert!(!store.remove("e1"));
        assert!(store.status("e1").is_none());
    }

    #[test]
    fn test_updates_through_store() {
        let store = ExecutionContextStore::default();
        store.create(record("e1"));

        assert!(store.update_status("e1", ExecutionStatus::Running));
        assert!(store.record_step_result("e1", StepResult::success("a", "X", json!({}), json!(1))));
        assert!(store.set_context_variable("e1", "tier", json!("gold")));
        assert!(!store.update_status("missing", ExecutionStatus::Running));
        assert!(!store.set_context_variable("missing", "x", json!(1)));

        let view = store.status("e1").unwrap();
        assert_eq!(view.status, ExecutionStatus::Running);
        assert_eq!(view.completed_steps, 1);
        assert_eq!(view.context_variables["tier"], json!("gold"));
    }

    #[test]
    fn test_status_is_stable_after_completion() {
        let store = ExecutionContextStore::default();
        store.create(record("e1"));
        store.update_status("e1", ExecutionStatus::Running);
        store.update_status("e1", ExecutionStatus::Completed);

        let first = store.status("e1").unwrap();
        let second = store.status("e1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_evict_expired_only_touches_finished_runs() {
        let store = ExecutionContextStore::new(Duration::ZERO);
        store.create(record("running"));
        store.create(record("done"));
        store.update_status("running", ExecutionStatus::Running);
        store.update_status("done", ExecutionStatus::Running);
        store.update_status("done", ExecutionStatus::Completed);

        assert_eq!(store.evict_expired(), 1);
        assert_eq!(store.ids(), vec!["running".to_string()]);
    }

    #[test]
    fn test_cancelled_run_kept_until_terminal_event() {
        let store = ExecutionContextStore::new(Duration::ZERO);
        let record = store.create(record("cancelled"));
        record.transition_to(ExecutionStatus::Running);
        assert!(record.cancel("stop"));

        assert_eq!(store.evict_expired(), 0);
        record.record_step_result(StepResult::success("a", "X", json!({}), json!({})));

        record.emit(&NoOpEventSink, EventType::ExecutionCancelled, json!({}));
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_retention_keeps_recent_runs() {
        let store = ExecutionContextStore::new(Duration::from_secs(3600));
        store.create(record("done"));
        store.update_status("done", ExecutionStatus::Failed);
        assert_eq!(store.evict_expired(), 0);
        assert_eq!(store.len(), 1);
    }
}
