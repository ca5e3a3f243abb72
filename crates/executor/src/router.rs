//! Signal routing to live runs.
//!
//! The router is the only rendezvous between the outside world (HTTP
//! handlers, the approval coordinator, the gateway) and a run's single
//! executor task. Each run registers an unbounded sender; signals sent
//! through the same sender are processed in receipt order.

use async_trait::async_trait;
use cascade_approval::{HumanInputNotifier, HumanInputResolution};
use cascade_core::RunId;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::ExecutorError;
use crate::signal::RunSignal;

/// Routes signals to the executor task of each live run.
#[derive(Debug, Default)]
pub struct SignalRouter {
    routes: DashMap<RunId, mpsc::UnboundedSender<RunSignal>>,
}

impl SignalRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run's signal channel.
    pub fn register(&self, run_id: RunId, sender: mpsc::UnboundedSender<RunSignal>) {
        self.routes.insert(run_id, sender);
    }

    /// Remove a finished run's channel.
    pub fn unregister(&self, run_id: &RunId) {
        self.routes.remove(run_id);
    }

    /// Deliver a signal to a live run.
    pub fn send(&self, run_id: &RunId, signal: RunSignal) -> Result<(), ExecutorError> {
        let sender = self.routes.get(run_id).ok_or_else(|| ExecutorError::RunNotLive {
            run_id: run_id.clone(),
        })?;
        sender.send(signal).map_err(|_| ExecutorError::RunNotLive {
            run_id: run_id.clone(),
        })
    }

    /// Whether the run still has a live executor.
    #[must_use]
    pub fn is_live(&self, run_id: &RunId) -> bool {
        self.routes.contains_key(run_id)
    }
}

#[async_trait]
impl HumanInputNotifier for SignalRouter {
    async fn notify(
        &self,
        run_id: &RunId,
        resolution: HumanInputResolution,
    ) -> Result<(), String> {
        self.send(run_id, RunSignal::HumanInputResolved(resolution))
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reaches_registered_run() {
        let router = SignalRouter::new();
        let run = RunId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(run.clone(), tx);

        router.send(&run, RunSignal::Cancel).unwrap();
        assert!(matches!(rx.recv().await, Some(RunSignal::Cancel)));
    }

    #[tokio::test]
    async fn send_to_unknown_run_fails() {
        let router = SignalRouter::new();
        let err = router.send(&RunId::generate(), RunSignal::Cancel).unwrap_err();
        assert!(matches!(err, ExecutorError::RunNotLive { .. }));
    }

    #[tokio::test]
    async fn unregister_makes_run_unreachable() {
        let router = SignalRouter::new();
        let run = RunId::generate();
        let (tx, _rx) = mpsc::unbounded_channel();
        router.register(run.clone(), tx);
        assert!(router.is_live(&run));

        router.unregister(&run);
        assert!(!router.is_live(&run));
        assert!(router.send(&run, RunSignal::Cancel).is_err());
    }

    #[tokio::test]
    async fn notifier_wraps_resolution_in_signal() {
        let router = SignalRouter::new();
        let run = RunId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(run.clone(), tx);

        let resolution = HumanInputResolution {
            request_id: cascade_core::ApprovalId::v4(),
            approved: true,
            selection: None,
            responded_by: Some("alice".into()),
            responded_at: chrono::Utc::now(),
            response_note: None,
        };
        router.notify(&run, resolution.clone()).await.unwrap();

        match rx.recv().await {
            Some(RunSignal::HumanInputResolved(got)) => {
                assert_eq!(got.request_id, resolution.request_id);
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}
