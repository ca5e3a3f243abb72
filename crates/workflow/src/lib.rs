#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Workflow
//!
//! The user-authored workflow graph: flat node/edge arrays as stored by
//! the editor, structural validation, petgraph-backed dependency
//! analysis, and the workflow persistence contract.
//!
//! Compilation to an action plan lives in `cascade-compiler`; this
//! crate is deliberately ignorant of component semantics beyond ids.

pub mod dependency;
pub mod error;
pub mod graph;
pub mod store;

pub use dependency::DependencyGraph;
pub use error::{GraphError, WorkflowStoreError};
pub use graph::{GraphEdge, GraphNode, NodeData, Position, Viewport, WorkflowGraph};
pub use store::{
    InMemoryWorkflowStore, WorkflowRecord, WorkflowStore, WorkflowVersion,
};
