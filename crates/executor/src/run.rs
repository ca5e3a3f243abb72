//! Run records and their persistence contract.

use async_trait::async_trait;
use cascade_core::{OrganizationId, RunId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Run-level lifecycle. Mutation happens only through the executor;
/// every terminal status ends the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Actively executing actions (or suspended on input).
    Running,
    /// All actions terminal-success-or-skipped.
    Completed,
    /// An unrecoverable action failure.
    Failed,
    /// Cancelled by signal.
    Cancelled,
    /// Forcefully terminated at the runtime layer.
    Terminated,
    /// The run-level deadline elapsed.
    TimedOut,
    /// The durable runtime cannot report a status.
    Unknown,
}

impl RunStatus {
    /// Whether the run has reached a terminal status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running | Self::Unknown)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Terminated => "TERMINATED",
            Self::TimedOut => "TIMED_OUT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Per-action state machine: `pending → running →
/// {completed, failed, awaiting_input, cancelled, skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Not yet started.
    Pending,
    /// Executing.
    Running,
    /// Finished with outputs.
    Completed,
    /// Failed terminally.
    Failed,
    /// Suspended on human input.
    AwaitingInput,
    /// Cancelled with the run.
    Cancelled,
    /// Never ran because the run ended first.
    Skipped,
}

/// A stored run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Stable external run id.
    pub run_id: RunId,
    /// The durable runtime's own execution id.
    pub internal_run_id: String,
    /// The workflow this run executes.
    pub workflow_id: WorkflowId,
    /// Number of actions in the compiled plan.
    pub total_actions: u32,
    /// Owning organization, when org-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    /// Current status.
    pub status: RunStatus,
    /// Final result payload, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Terminal error message, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Errors raised by the run store.
#[derive(Debug, Error)]
pub enum RunStoreError {
    /// The run id does not resolve.
    #[error("run not found: {run_id}")]
    NotFound {
        /// The missing run id.
        run_id: RunId,
    },

    /// The backing store failed.
    #[error("run store backend: {0}")]
    Backend(String),
}

/// Persistence seam for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a fresh record.
    async fn insert(&self, record: RunRecord) -> Result<(), RunStoreError>;

    /// Fetch by run id.
    async fn get(&self, run_id: &RunId) -> Result<RunRecord, RunStoreError>;

    /// Update status (and optionally result/error), bumping `updated_at`.
    async fn set_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<RunRecord, RunStoreError>;

    /// All runs of a workflow, newest first.
    async fn list_by_workflow(&self, workflow_id: WorkflowId)
    -> Result<Vec<RunRecord>, RunStoreError>;
}

/// In-memory run store.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: dashmap::DashMap<RunId, RunRecord>,
}

impl InMemoryRunStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert(&self, record: RunRecord) -> Result<(), RunStoreError> {
        self.runs.insert(record.run_id.clone(), record);
        Ok(())
    }

    async fn get(&self, run_id: &RunId) -> Result<RunRecord, RunStoreError> {
        self.runs
            .get(run_id)
            .map(|r| r.clone())
            .ok_or_else(|| RunStoreError::NotFound {
                run_id: run_id.clone(),
            })
    }

    async fn set_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<RunRecord, RunStoreError> {
        let mut record = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| RunStoreError::NotFound {
                run_id: run_id.clone(),
            })?;
        record.status = status;
        if result.is_some() {
            record.result = result;
        }
        if error.is_some() {
            record.error = error;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_by_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<RunRecord>, RunStoreError> {
        let mut records: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|r| r.workflow_id == workflow_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
