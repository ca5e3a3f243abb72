//! Approval request records.

use cascade_core::{ApprovalId, NodeRef, OrganizationId, RunId, WorkflowId};
use cascade_component::HumanInputType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::token::ResolutionToken;

/// Lifecycle of an approval request. Transitions out of `Pending`
/// happen exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved by a responder.
    Approved,
    /// Rejected by a responder.
    Rejected,
    /// The deadline passed before a decision.
    Expired,
    /// The owning run was cancelled or terminated.
    Cancelled,
}

impl ApprovalStatus {
    /// Whether the record can still transition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A durable, token-addressable question posed to a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Record id; equals the executor's pending-input request id.
    pub id: ApprovalId,
    /// The run waiting on this request.
    pub run_id: RunId,
    /// The workflow the run executes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    /// The suspended action.
    pub node_ref: NodeRef,
    /// Approval or selection.
    pub input_type: HumanInputType,
    /// Current status.
    pub status: ApprovalStatus,
    /// Short human-facing title.
    pub title: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Structured context (selection options, diffs, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Token that resolves this record as approved.
    #[serde(skip)]
    pub approve_token: Option<ResolutionToken>,
    /// Token that resolves this record as rejected.
    #[serde(skip)]
    pub reject_token: Option<ResolutionToken>,
    /// Deadline, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_at: Option<DateTime<Utc>>,
    /// When the record left `pending`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    /// Who resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_by: Option<String>,
    /// Free-form note from the responder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_note: Option<String>,
    /// Owning organization, when org-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input to [`crate::coordinator::PauseResumeCoordinator::create`].
#[derive(Debug, Clone)]
pub struct NewApprovalRequest {
    /// Record id; supplied by the executor so the signal round-trips.
    pub id: ApprovalId,
    /// The run waiting on this request.
    pub run_id: RunId,
    /// The workflow the run executes.
    pub workflow_id: Option<WorkflowId>,
    /// The suspended action.
    pub node_ref: NodeRef,
    /// Approval or selection.
    pub input_type: HumanInputType,
    /// Title shown to the approver.
    pub title: String,
    /// Description shown to the approver.
    pub description: Option<String>,
    /// Structured context.
    pub context: Option<Value>,
    /// Deadline, when set.
    pub timeout_at: Option<DateTime<Utc>>,
    /// Owning organization.
    pub organization_id: Option<OrganizationId>,
}

/// A responder's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// `true` to approve, `false` to reject.
    pub approved: bool,
    /// For selections: the chosen value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Value>,
    /// Who decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_by: Option<String>,
    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_note: Option<String>,
}

impl Decision {
    /// A plain approval.
    #[must_use]
    pub fn approve() -> Self {
        Self {
            approved: true,
            selection: None,
            responded_by: None,
            response_note: None,
        }
    }

    /// A plain rejection.
    #[must_use]
    pub fn reject() -> Self {
        Self {
            approved: false,
            selection: None,
            responded_by: None,
            response_note: None,
        }
    }

    /// Attach the responder identity.
    #[must_use]
    pub fn by(mut self, responder: impl Into<String>) -> Self {
        self.responded_by = Some(responder.into());
        self
    }

    /// Attach a note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.response_note = Some(note.into());
        self
    }
}

/// The resolution payload delivered to the waiting run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanInputResolution {
    /// The resolved request.
    pub request_id: ApprovalId,
    /// The decision.
    pub approved: bool,
    /// For selections: the chosen value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Value>,
    /// Who decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_by: Option<String>,
    /// When the decision landed.
    pub responded_at: DateTime<Utc>,
    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Rejected.is_terminal());
        assert!(ApprovalStatus::Expired.is_terminal());
        assert!(ApprovalStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_display() {
        assert_eq!(ApprovalStatus::Pending.to_string(), "pending");
        assert_eq!(ApprovalStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn decision_builders() {
        let decision = Decision::approve().by("alice").with_note("ship it");
        assert!(decision.approved);
        assert_eq!(decision.responded_by.as_deref(), Some("alice"));
        assert_eq!(decision.response_note.as_deref(), Some("ship it"));
    }

    #[test]
    fn record_serde_never_exposes_tokens() {
        let record = ApprovalRequest {
            id: ApprovalId::v4(),
            run_id: RunId::generate(),
            workflow_id: None,
            node_ref: NodeRef::new("gate").unwrap(),
            input_type: HumanInputType::Approval,
            status: ApprovalStatus::Pending,
            title: "Promote".into(),
            description: None,
            context: None,
            approve_token: Some(ResolutionToken::mint()),
            reject_token: Some(ResolutionToken::mint()),
            timeout_at: None,
            responded_at: None,
            responded_by: None,
            response_note: None,
            organization_id: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains(record.approve_token.as_ref().unwrap().reveal()));
        assert!(!json.contains("approveToken"));
    }
}
