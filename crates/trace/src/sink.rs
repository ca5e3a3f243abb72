//! The trace sink: store plus per-run push delivery.
//!
//! Events are persisted first, then fanned out to subscribers over a
//! broadcast channel. Delivery is fire-and-forget — subscribers that
//! lag fall back to polling `list_since` with their last seen sequence.

use std::sync::Arc;

use cascade_core::RunId;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::event::{NewTraceEvent, TraceEvent, TraceEventType};
use crate::store::{TraceStore, TraceStoreError};

const SUBSCRIBER_BUFFER: usize = 256;

/// Run-scoped append + subscribe facade over a [`TraceStore`].
pub struct TraceSink {
    store: Arc<dyn TraceStore>,
    channels: DashMap<RunId, broadcast::Sender<TraceEvent>>,
}

impl TraceSink {
    /// Create a sink over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn TraceStore>) -> Self {
        Self {
            store,
            channels: DashMap::new(),
        }
    }

    /// The underlying store, for read paths.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TraceStore> {
        &self.store
    }

    /// Append an event and notify subscribers of its run.
    pub async fn append(&self, event: NewTraceEvent) -> Result<TraceEvent, TraceStoreError> {
        let stored = self.store.append(event).await?;
        if let Some(sender) = self.channels.get(&stored.body.run_id) {
            // No active receivers is fine.
            let _ = sender.send(stored.clone());
        }
        Ok(stored)
    }

    /// Subscribe to events of one run. Events appended after this call
    /// are delivered; use `list_since` to backfill earlier ones.
    #[must_use]
    pub fn subscribe_to_run(&self, run_id: &RunId) -> broadcast::Receiver<TraceEvent> {
        self.channels
            .entry(run_id.clone())
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0)
            .subscribe()
    }

    /// Drop the run's channel once the run is finished and drained.
    pub fn release_run(&self, run_id: &RunId) {
        self.channels.remove(run_id);
    }

    /// All events of a run, ordered by sequence.
    pub async fn list_by_run(&self, run_id: &RunId) -> Result<Vec<TraceEvent>, TraceStoreError> {
        self.store.list_by_run(run_id).await
    }

    /// Events after the given cursor, for streaming resumption.
    pub async fn list_since(
        &self,
        run_id: &RunId,
        after_seq: u64,
    ) -> Result<Vec<TraceEvent>, TraceStoreError> {
        self.store.list_since(run_id, after_seq).await
    }

    /// Count events of one type, for progress computation.
    pub async fn count_by_type(
        &self,
        run_id: &RunId,
        r#type: TraceEventType,
    ) -> Result<u64, TraceStoreError> {
        self.store.count_by_type(run_id, r#type).await
    }
}

impl std::fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSink")
            .field("subscribed_runs", &self.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTraceStore;
    use cascade_core::NodeRef;
    use pretty_assertions::assert_eq;

    fn sink() -> TraceSink {
        TraceSink::new(Arc::new(InMemoryTraceStore::new()))
    }

    fn event(run: &RunId) -> NewTraceEvent {
        NewTraceEvent::new(
            run.clone(),
            TraceEventType::NodeProgress,
            NodeRef::new("n").unwrap(),
        )
    }

    #[tokio::test]
    async fn append_persists_and_pushes() {
        let sink = sink();
        let run = RunId::generate();
        let mut sub = sink.subscribe_to_run(&run);

        sink.append(event(&run)).await.unwrap();

        let pushed = sub.recv().await.unwrap();
        assert_eq!(pushed.sequence, 1);
        assert_eq!(sink.list_by_run(&run).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_without_subscribers_still_persists() {
        let sink = sink();
        let run = RunId::generate();
        sink.append(event(&run)).await.unwrap();
        assert_eq!(sink.list_by_run(&run).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subscribers_only_see_their_run() {
        let sink = sink();
        let run_a = RunId::generate();
        let run_b = RunId::generate();
        let mut sub_b = sink.subscribe_to_run(&run_b);

        sink.append(event(&run_a)).await.unwrap();
        sink.append(event(&run_b)).await.unwrap();

        let got = sub_b.recv().await.unwrap();
        assert_eq!(got.body.run_id, run_b);
        assert!(sub_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn polling_backfills_missed_events() {
        let sink = sink();
        let run = RunId::generate();
        sink.append(event(&run)).await.unwrap();
        sink.append(event(&run)).await.unwrap();

        // Late subscriber backfills via the cursor, then follows pushes.
        let mut sub = sink.subscribe_to_run(&run);
        let backfill = sink.list_since(&run, 0).await.unwrap();
        assert_eq!(backfill.len(), 2);

        sink.append(event(&run)).await.unwrap();
        assert_eq!(sub.recv().await.unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn release_run_drops_channel() {
        let sink = sink();
        let run = RunId::generate();
        let _sub = sink.subscribe_to_run(&run);
        sink.release_run(&run);
        // Appends after release persist without panicking.
        sink.append(event(&run)).await.unwrap();
    }
}
