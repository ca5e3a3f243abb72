//! Trace persistence contract and the in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use cascade_core::RunId;
use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::event::{NewTraceEvent, TraceEvent, TraceEventType};

/// Errors raised by a trace store.
#[derive(Debug, Error)]
pub enum TraceStoreError {
    /// Two appenders raced on the same `(run, sequence)` slot. The
    /// caller retries; the in-memory store serializes appends and never
    /// returns this, but database-backed implementations surface their
    /// unique-constraint violation here.
    #[error("sequence conflict for run {run_id} at {sequence}")]
    SequenceConflict {
        /// The run being appended to.
        run_id: RunId,
        /// The contested sequence number.
        sequence: u64,
    },

    /// The backing store failed.
    #[error("trace store backend: {0}")]
    Backend(String),
}

/// Append-only, per-run sequenced event log.
///
/// `append` assigns `sequence = last_sequence(run) + 1` atomically.
/// Readers never block writers.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Append an event, assigning its sequence and timestamp.
    async fn append(&self, event: NewTraceEvent) -> Result<TraceEvent, TraceStoreError>;

    /// All events of a run, ordered by sequence.
    async fn list_by_run(&self, run_id: &RunId) -> Result<Vec<TraceEvent>, TraceStoreError>;

    /// Events with `sequence > after_seq`, ordered by sequence.
    async fn list_since(
        &self,
        run_id: &RunId,
        after_seq: u64,
    ) -> Result<Vec<TraceEvent>, TraceStoreError>;

    /// Number of events of the given type for a run.
    async fn count_by_type(
        &self,
        run_id: &RunId,
        r#type: TraceEventType,
    ) -> Result<u64, TraceStoreError>;

    /// Highest assigned sequence for a run; 0 when none.
    async fn last_sequence(&self, run_id: &RunId) -> Result<u64, TraceStoreError>;
}

/// In-memory trace store. A per-run mutex serializes the
/// `last_sequence → append` step; reads clone out under the same lock
/// held briefly.
#[derive(Debug, Default)]
pub struct InMemoryTraceStore {
    runs: Mutex<HashMap<RunId, Vec<TraceEvent>>>,
}

impl InMemoryTraceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceStore for InMemoryTraceStore {
    async fn append(&self, event: NewTraceEvent) -> Result<TraceEvent, TraceStoreError> {
        let mut runs = self.runs.lock();
        let events = runs.entry(event.run_id.clone()).or_default();
        let stored = TraceEvent {
            sequence: events.last().map_or(0, |e| e.sequence) + 1,
            timestamp: Utc::now(),
            body: event,
        };
        events.push(stored.clone());
        Ok(stored)
    }

    async fn list_by_run(&self, run_id: &RunId) -> Result<Vec<TraceEvent>, TraceStoreError> {
        Ok(self.runs.lock().get(run_id).cloned().unwrap_or_default())
    }

    async fn list_since(
        &self,
        run_id: &RunId,
        after_seq: u64,
    ) -> Result<Vec<TraceEvent>, TraceStoreError> {
        Ok(self
            .runs
            .lock()
            .get(run_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.sequence > after_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_by_type(
        &self,
        run_id: &RunId,
        r#type: TraceEventType,
    ) -> Result<u64, TraceStoreError> {
        Ok(self
            .runs
            .lock()
            .get(run_id)
            .map(|events| events.iter().filter(|e| e.body.r#type == r#type).count() as u64)
            .unwrap_or(0))
    }

    async fn last_sequence(&self, run_id: &RunId) -> Result<u64, TraceStoreError> {
        Ok(self
            .runs
            .lock()
            .get(run_id)
            .and_then(|events| events.last())
            .map_or(0, |e| e.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::NodeRef;
    use pretty_assertions::assert_eq;

    fn event(run: &RunId, r#type: TraceEventType) -> NewTraceEvent {
        NewTraceEvent::new(run.clone(), r#type, NodeRef::new("n").unwrap())
    }

    #[tokio::test]
    async fn sequences_start_at_one_and_increase() {
        let store = InMemoryTraceStore::new();
        let run = RunId::generate();

        let first = store
            .append(event(&run, TraceEventType::NodeStarted))
            .await
            .unwrap();
        let second = store
            .append(event(&run, TraceEventType::NodeCompleted))
            .await
            .unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(store.last_sequence(&run).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sequences_are_per_run() {
        let store = InMemoryTraceStore::new();
        let run_a = RunId::generate();
        let run_b = RunId::generate();

        store
            .append(event(&run_a, TraceEventType::NodeStarted))
            .await
            .unwrap();
        let b = store
            .append(event(&run_b, TraceEventType::NodeStarted))
            .await
            .unwrap();
        assert_eq!(b.sequence, 1);
    }

    #[tokio::test]
    async fn list_is_ordered_and_gap_free() {
        let store = InMemoryTraceStore::new();
        let run = RunId::generate();
        for _ in 0..5 {
            store
                .append(event(&run, TraceEventType::NodeProgress))
                .await
                .unwrap();
        }

        let events = store.list_by_run(&run).await.unwrap();
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn list_since_resumes_after_cursor() {
        let store = InMemoryTraceStore::new();
        let run = RunId::generate();
        for _ in 0..4 {
            store
                .append(event(&run, TraceEventType::NodeProgress))
                .await
                .unwrap();
        }

        let tail = store.list_since(&run, 2).await.unwrap();
        let sequences: Vec<u64> = tail.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[tokio::test]
    async fn count_by_type_filters() {
        let store = InMemoryTraceStore::new();
        let run = RunId::generate();
        store
            .append(event(&run, TraceEventType::NodeStarted))
            .await
            .unwrap();
        store
            .append(event(&run, TraceEventType::NodeCompleted))
            .await
            .unwrap();
        store
            .append(event(&run, TraceEventType::NodeCompleted))
            .await
            .unwrap();

        assert_eq!(
            store
                .count_by_type(&run, TraceEventType::NodeCompleted)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .count_by_type(&run, TraceEventType::NodeFailed)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn unknown_run_is_empty() {
        let store = InMemoryTraceStore::new();
        let run = RunId::generate();
        assert!(store.list_by_run(&run).await.unwrap().is_empty());
        assert_eq!(store.last_sequence(&run).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_appends_stay_gap_free() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryTraceStore::new());
        let run = RunId::generate();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let run = run.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store
                        .append(NewTraceEvent::new(
                            run.clone(),
                            TraceEventType::NodeProgress,
                            NodeRef::new("n").unwrap(),
                        ))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = store.list_by_run(&run).await.unwrap();
        assert_eq!(events.len(), 200);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, i as u64 + 1);
        }
    }
}
