//! Compilation errors.

use cascade_core::ErrorKind;
use cascade_workflow::GraphError;
use thiserror::Error;

/// Why a graph failed to compile. All variants surface as validation
/// failures — a graph that does not compile is a client error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// The graph failed its structural invariants.
    #[error(transparent)]
    InvalidGraph(#[from] GraphError),

    /// A node references a component id that is not registered.
    #[error("node {node_id} references unknown component {component_id}")]
    UnknownComponent {
        /// The referencing node.
        node_id: String,
        /// The unresolved component id.
        component_id: String,
    },

    /// No trigger-category node without incoming edges exists.
    #[error("graph has no trigger node")]
    MissingTrigger,

    /// More than one trigger-category node without incoming edges exists.
    #[error("graph has multiple trigger nodes: {}", node_ids.join(", "))]
    AmbiguousTrigger {
        /// The competing trigger nodes, sorted by id.
        node_ids: Vec<String>,
    },

    /// The graph contains a dependency cycle.
    #[error("dependency cycle through nodes: {}", node_ids.join(", "))]
    CycleDetected {
        /// Nodes participating in a cycle, sorted by id.
        node_ids: Vec<String>,
    },

    /// A required input port has no edge, config value, or default.
    #[error("node {node_id} input {input_id} has no binding")]
    MissingBinding {
        /// The node with the unsatisfied port.
        node_id: String,
        /// The unsatisfied input port id.
        input_id: String,
    },
}

impl CompileError {
    /// Taxonomy kind for HTTP surfacing.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }

    /// Stable machine-readable discriminant carried in API error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidGraph(_) => "InvalidGraph",
            Self::UnknownComponent { .. } => "UnknownComponent",
            Self::MissingTrigger => "MissingTrigger",
            Self::AmbiguousTrigger { .. } => "AmbiguousTrigger",
            Self::CycleDetected { .. } => "CycleDetected",
            Self::MissingBinding { .. } => "MissingBinding",
        }
    }
}
