//! Executor errors.

use cascade_core::{ErrorKind, RunId};
use thiserror::Error;

use crate::run::RunStoreError;

/// Errors raised at the executor/runtime boundary.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The run has no live executor to receive signals.
    #[error("run is not live: {run_id}")]
    RunNotLive {
        /// The targeted run.
        run_id: RunId,
    },

    /// The plan references a component the registry does not know.
    /// Compilation prevents this; it guards against registry drift
    /// between compile and execute.
    #[error("component not registered: {component_id}")]
    UnknownComponent {
        /// The unresolved component id.
        component_id: String,
    },

    /// The run store failed.
    #[error(transparent)]
    Store(#[from] RunStoreError),

    /// The approval subsystem failed.
    #[error(transparent)]
    Approval(#[from] cascade_approval::ApprovalError),
}

impl ExecutorError {
    /// Taxonomy kind for HTTP surfacing.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RunNotLive { .. } => ErrorKind::NotFound,
            Self::UnknownComponent { .. } => ErrorKind::Configuration,
            Self::Store(RunStoreError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Store(RunStoreError::Backend(_)) => ErrorKind::Internal,
            Self::Approval(e) => e.kind(),
        }
    }
}
