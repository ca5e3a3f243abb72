//! Tool-call result retention.
//!
//! Results are kept for the longer of the gateway poll window and five
//! minutes, then pruned to cap memory. Re-inserting a completed call id
//! is a no-op, which makes `executeToolCall` idempotent.

use std::time::Duration;

use cascade_core::CallId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::signal::ToolCallResult;

/// Minimum retention of a completed result.
pub const RESULT_RETENTION: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Stored {
    result: ToolCallResult,
    completed_at: DateTime<Utc>,
}

/// Per-run map of completed (and in-flight) tool calls.
#[derive(Debug, Default)]
pub struct ToolCallResults {
    completed: DashMap<CallId, Stored>,
    in_flight: DashMap<CallId, ()>,
}

impl ToolCallResults {
    /// Create an empty result map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a call id for execution. Returns `false` when the id is
    /// already in flight or completed — the duplicate signal must be
    /// ignored.
    #[must_use]
    pub fn claim(&self, call_id: &CallId) -> bool {
        if self.completed.contains_key(call_id) {
            return false;
        }
        self.in_flight.insert(call_id.clone(), ()).is_none()
    }

    /// Record the result of a claimed call.
    pub fn complete(&self, call_id: &CallId, result: ToolCallResult) {
        self.in_flight.remove(call_id);
        self.completed.entry(call_id.clone()).or_insert(Stored {
            result,
            completed_at: Utc::now(),
        });
    }

    /// Fetch a completed result.
    #[must_use]
    pub fn get(&self, call_id: &CallId) -> Option<ToolCallResult> {
        self.completed.get(call_id).map(|s| s.result.clone())
    }

    /// Drop results older than the retention window. Returns how many
    /// were pruned.
    pub fn prune(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        let stale: Vec<CallId> = self
            .completed
            .iter()
            .filter(|entry| entry.completed_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        let count = stale.len();
        for call_id in stale {
            self.completed.remove(&call_id);
        }
        count
    }

    /// Number of retained results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// Returns `true` when nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{NodeRef, RunId};
    use pretty_assertions::assert_eq;

    fn call_id(millis: u64) -> CallId {
        CallId::new(
            &RunId::generate(),
            &NodeRef::new("n1").unwrap(),
            millis,
        )
    }

    #[test]
    fn claim_complete_get() {
        let results = ToolCallResults::new();
        let id = call_id(1);

        assert!(results.claim(&id));
        assert!(results.get(&id).is_none());

        results.complete(&id, ToolCallResult::ok(serde_json::json!(1)));
        assert_eq!(results.get(&id).unwrap().output, Some(serde_json::json!(1)));
    }

    #[test]
    fn duplicate_claim_is_rejected() {
        let results = ToolCallResults::new();
        let id = call_id(1);

        assert!(results.claim(&id));
        assert!(!results.claim(&id)); // in flight
        results.complete(&id, ToolCallResult::ok(serde_json::json!("first")));
        assert!(!results.claim(&id)); // completed
    }

    #[test]
    fn complete_does_not_overwrite() {
        let results = ToolCallResults::new();
        let id = call_id(1);
        let _ = results.claim(&id);
        results.complete(&id, ToolCallResult::ok(serde_json::json!("first")));
        results.complete(&id, ToolCallResult::ok(serde_json::json!("second")));
        assert_eq!(
            results.get(&id).unwrap().output,
            Some(serde_json::json!("first"))
        );
    }

    #[test]
    fn prune_removes_only_stale() {
        let results = ToolCallResults::new();
        let id = call_id(1);
        let _ = results.claim(&id);
        results.complete(&id, ToolCallResult::ok(serde_json::json!(1)));

        assert_eq!(results.prune(Duration::from_secs(3600)), 0);
        assert_eq!(results.len(), 1);
        assert_eq!(results.prune(Duration::ZERO), 1);
        assert!(results.is_empty());
    }
}
