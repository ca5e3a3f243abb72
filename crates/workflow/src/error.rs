//! Graph-level error types.

use cascade_core::ErrorKind;
use thiserror::Error;

/// Structural violations of the workflow graph invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A node has an empty id.
    #[error("node with empty id")]
    EmptyNodeId,

    /// Two nodes share an id.
    #[error("duplicate node id: {node_id}")]
    DuplicateNodeId {
        /// The duplicated id.
        node_id: String,
    },

    /// An edge endpoint does not resolve to a node.
    #[error("edge {edge_id} references unknown node {node_id}")]
    DanglingEdge {
        /// The offending edge id.
        edge_id: String,
        /// The unresolved endpoint.
        node_id: String,
    },
}

impl GraphError {
    /// Taxonomy kind — structural violations are validation failures.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Errors raised by the workflow store.
#[derive(Debug, Error)]
pub enum WorkflowStoreError {
    /// The workflow id does not resolve.
    #[error("workflow not found: {workflow_id}")]
    NotFound {
        /// The missing workflow id.
        workflow_id: cascade_core::WorkflowId,
    },

    /// The requested version does not exist for the workflow.
    #[error("workflow {workflow_id} has no version {version}")]
    VersionNotFound {
        /// The workflow id.
        workflow_id: cascade_core::WorkflowId,
        /// The missing version.
        version: u32,
    },

    /// The graph failed structural validation.
    #[error(transparent)]
    InvalidGraph(#[from] GraphError),
}

impl WorkflowStoreError {
    /// Taxonomy kind for HTTP surfacing.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidGraph(e) => e.kind(),
        }
    }
}
