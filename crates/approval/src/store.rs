//! Approval persistence contract and in-memory implementation.
//!
//! The store owns the atomicity of resolution: `mark_resolved` checks
//! `pending` and the deadline inside one critical section, so a record
//! transitions out of `pending` exactly once no matter how many
//! resolvers race.

use std::collections::HashMap;

use async_trait::async_trait;
use cascade_core::{ApprovalId, RunId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::ApprovalError;
use crate::request::{ApprovalRequest, ApprovalStatus, Decision};

/// Which of a record's two tokens was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// The approve token.
    Approve,
    /// The reject token.
    Reject,
}

/// Persistence seam for approval records.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Insert a pending record.
    async fn insert(&self, record: ApprovalRequest) -> Result<(), ApprovalError>;

    /// Fetch a record by id.
    async fn get(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError>;

    /// Find the record matching a presented token, constant-time
    /// compared, along with which token matched. Only pending records
    /// resolve — unknown and already-resolved are indistinguishable.
    async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<(ApprovalRequest, TokenKind), ApprovalError>;

    /// Atomically resolve a pending record. Fails `AlreadyResolved`
    /// when it left pending earlier, and `Expired` (after transitioning
    /// the record) when `now` is past the deadline.
    async fn mark_resolved(
        &self,
        id: ApprovalId,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, ApprovalError>;

    /// Transition a pending record to `expired` after its deadline
    /// fires unanswered.
    async fn mark_expired(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError>;

    /// Terminal transition to `cancelled` from any non-terminal state.
    /// Idempotent on already-cancelled records.
    async fn mark_cancelled(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError>;

    /// All records for a run.
    async fn list_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRequest>, ApprovalError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<ApprovalRequest>, ApprovalError>;
}

/// In-memory approval store.
#[derive(Debug, Default)]
pub struct InMemoryApprovalStore {
    records: Mutex<HashMap<ApprovalId, ApprovalRequest>>,
}

impl InMemoryApprovalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn insert(&self, record: ApprovalRequest) -> Result<(), ApprovalError> {
        self.records.lock().insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError> {
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ApprovalError::NotFound { id })
    }

    async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<(ApprovalRequest, TokenKind), ApprovalError> {
        let records = self.records.lock();
        for record in records.values() {
            if record.status != ApprovalStatus::Pending {
                continue;
            }
            if record
                .approve_token
                .as_ref()
                .is_some_and(|t| t.matches(token))
            {
                return Ok((record.clone(), TokenKind::Approve));
            }
            if record
                .reject_token
                .as_ref()
                .is_some_and(|t| t.matches(token))
            {
                return Ok((record.clone(), TokenKind::Reject));
            }
        }
        Err(ApprovalError::TokenNotFound)
    }

    async fn mark_resolved(
        &self,
        id: ApprovalId,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(ApprovalError::NotFound { id })?;

        if record.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyResolved {
                id,
                status: record.status,
            });
        }
        if record.timeout_at.is_some_and(|deadline| now > deadline) {
            record.status = ApprovalStatus::Expired;
            record.responded_at = Some(now);
            return Err(ApprovalError::Expired { id });
        }

        record.status = if decision.approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        record.responded_at = Some(now);
        record.responded_by = decision.responded_by.clone();
        record.response_note = decision.response_note.clone();
        Ok(record.clone())
    }

    async fn mark_expired(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError> {
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(ApprovalError::NotFound { id })?;
        match record.status {
            ApprovalStatus::Pending => {
                record.status = ApprovalStatus::Expired;
                record.responded_at = Some(Utc::now());
                Ok(record.clone())
            }
            status => Err(ApprovalError::AlreadyResolved { id, status }),
        }
    }

    async fn mark_cancelled(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError> {
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(ApprovalError::NotFound { id })?;
        match record.status {
            ApprovalStatus::Pending | ApprovalStatus::Cancelled => {
                record.status = ApprovalStatus::Cancelled;
                Ok(record.clone())
            }
            status => Err(ApprovalError::AlreadyResolved { id, status }),
        }
    }

    async fn list_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let mut records: Vec<ApprovalRequest> = self
            .records
            .lock()
            .values()
            .filter(|r| &r.run_id == run_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn list(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let mut records: Vec<ApprovalRequest> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
