#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Compiler
//!
//! Translates a user-authored workflow graph into a linear,
//! dependency-ordered [`ActionPlan`]:
//!
//! 1. every node resolves to a registered component;
//! 2. exactly one trigger node with no incoming edges exists;
//! 3. Kahn's algorithm fixes the topological order (cycles are errors);
//! 4. every required input of a non-entry node is satisfied by an edge,
//!    a config value, or a schema default;
//! 5. actions are emitted with `depends_on` and sorted bindings.
//!
//! Two compilations of the same graph against the same registry yield
//! byte-identical plan JSON.

pub mod compile;
pub mod error;
pub mod plan;

pub use compile::Compiler;
pub use error::CompileError;
pub use plan::{Action, ActionPlan, Binding, Entrypoint, PlanConfig};
