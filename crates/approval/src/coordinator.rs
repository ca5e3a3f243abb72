//! The pause/resume coordinator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cascade_core::{ApprovalId, RunId};
use chrono::Utc;

use crate::error::ApprovalError;
use crate::request::{
    ApprovalRequest, ApprovalStatus, Decision, HumanInputResolution, NewApprovalRequest,
};
use crate::store::{ApprovalStore, TokenKind};
use crate::token::ResolutionToken;

/// Delivers a resolution to the owning run. Implemented by the
/// executor's runtime as the `humanInputResolved` signal.
#[async_trait]
pub trait HumanInputNotifier: Send + Sync {
    /// Deliver one resolution. Failure is reported, never retried here.
    async fn notify(
        &self,
        run_id: &RunId,
        resolution: HumanInputResolution,
    ) -> Result<(), String>;
}

/// The links minted for a fresh request.
#[derive(Debug, Clone)]
pub struct MintedTokens {
    /// Resolves the record as approved.
    pub approve_token: String,
    /// Resolves the record as rejected.
    pub reject_token: String,
}

/// Approval and selection lifecycle over an [`ApprovalStore`], with
/// signal delivery to the waiting run.
///
/// The record is the source of truth: a failed signal send is logged
/// and retried once, but never rolls the record back — the workflow
/// picks the state up at its next wakeup.
pub struct PauseResumeCoordinator {
    store: Arc<dyn ApprovalStore>,
    notifier: Arc<dyn HumanInputNotifier>,
    signal_retry_delay: Duration,
}

impl PauseResumeCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(store: Arc<dyn ApprovalStore>, notifier: Arc<dyn HumanInputNotifier>) -> Self {
        Self {
            store,
            notifier,
            signal_retry_delay: Duration::from_secs(1),
        }
    }

    /// Shorten the signal retry delay (tests).
    #[must_use]
    pub fn with_signal_retry_delay(mut self, delay: Duration) -> Self {
        self.signal_retry_delay = delay;
        self
    }

    /// The backing store, for read paths.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ApprovalStore> {
        &self.store
    }

    /// Insert a pending record and mint its two resolution tokens.
    pub async fn create(
        &self,
        input: NewApprovalRequest,
    ) -> Result<(ApprovalRequest, MintedTokens), ApprovalError> {
        let approve_token = ResolutionToken::mint();
        let reject_token = ResolutionToken::mint();
        let record = ApprovalRequest {
            id: input.id,
            run_id: input.run_id,
            workflow_id: input.workflow_id,
            node_ref: input.node_ref,
            input_type: input.input_type,
            status: ApprovalStatus::Pending,
            title: input.title,
            description: input.description,
            context: input.context,
            approve_token: Some(approve_token.clone()),
            reject_token: Some(reject_token.clone()),
            timeout_at: input.timeout_at,
            responded_at: None,
            responded_by: None,
            response_note: None,
            organization_id: input.organization_id,
            created_at: Utc::now(),
        };
        self.store.insert(record.clone()).await?;

        tracing::info!(
            approval_id = %record.id,
            run_id = %record.run_id,
            node_ref = %record.node_ref,
            "approval request created"
        );

        Ok((
            record,
            MintedTokens {
                approve_token: approve_token.reveal().to_owned(),
                reject_token: reject_token.reveal().to_owned(),
            },
        ))
    }

    /// Resolve a record by id with an explicit decision.
    pub async fn resolve(
        &self,
        id: ApprovalId,
        decision: Decision,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let record = self.store.mark_resolved(id, &decision, Utc::now()).await?;
        self.deliver_signal(&record, &decision).await;
        Ok(record)
    }

    /// Resolve whichever pending record the token addresses. The token
    /// kind encodes the decision; `note` and `responded_by` ride along.
    pub async fn resolve_by_token(
        &self,
        token: &str,
        responded_by: Option<String>,
        note: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let (record, kind) = self.store.find_by_token(token).await?;
        let mut decision = match kind {
            TokenKind::Approve => Decision::approve(),
            TokenKind::Reject => Decision::reject(),
        };
        decision.responded_by = responded_by;
        decision.response_note = note;
        self.resolve(record.id, decision).await
    }

    /// Transition a pending record to `expired` after its deadline
    /// fired unanswered. Called by the executor, which owns the timer.
    pub async fn expire(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError> {
        let record = self.store.mark_expired(id).await?;
        tracing::info!(approval_id = %id, run_id = %record.run_id, "approval expired");
        Ok(record)
    }

    /// Terminal transition to `cancelled`; used when a run is
    /// forcefully terminated. No signal is sent — the run is going away.
    pub async fn cancel(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError> {
        let record = self.store.mark_cancelled(id).await?;
        tracing::info!(approval_id = %id, "approval cancelled");
        Ok(record)
    }

    /// Cancel every pending request of a run.
    pub async fn cancel_run(&self, run_id: &RunId) -> Result<usize, ApprovalError> {
        let mut cancelled = 0;
        for record in self.store.list_by_run(run_id).await? {
            if record.status == ApprovalStatus::Pending {
                self.store.mark_cancelled(record.id).await?;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// Signal the owning run. Failures are logged, retried once, and
    /// then dropped — the record remains authoritative either way.
    async fn deliver_signal(&self, record: &ApprovalRequest, decision: &Decision) {
        let resolution = HumanInputResolution {
            request_id: record.id,
            approved: decision.approved,
            selection: decision.selection.clone(),
            responded_by: record.responded_by.clone(),
            responded_at: record.responded_at.unwrap_or_else(Utc::now),
            response_note: record.response_note.clone(),
        };

        match self.notifier.notify(&record.run_id, resolution.clone()).await {
            Ok(()) => {}
            Err(first) => {
                tracing::warn!(
                    approval_id = %record.id,
                    run_id = %record.run_id,
                    error = %first,
                    "human input signal failed, retrying once"
                );
                tokio::time::sleep(self.signal_retry_delay).await;
                if let Err(second) = self.notifier.notify(&record.run_id, resolution).await {
                    tracing::warn!(
                        approval_id = %record.id,
                        run_id = %record.run_id,
                        error = %second,
                        "human input signal failed after retry; record remains authoritative"
                    );
                }
            }
        }
    }
}
