#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Core
//!
//! Identifier types and the error taxonomy shared by every Cascade
//! crate.
//!
//! Two families of identifiers exist:
//!
//! - UUID-backed ids ([`WorkflowId`], [`OrganizationId`], [`ApprovalId`],
//!   [`AgentId`], [`FileId`], [`ArtifactId`]) — `Copy`, 16 bytes,
//!   type-safe via domain markers.
//! - String-backed references ([`RunId`], [`NodeRef`], [`CallId`]) —
//!   externally visible identifiers whose shape is part of the public
//!   contract (run ids are stable across the durable runtime boundary;
//!   node refs are authored by users in the graph editor).
//!
//! [`ErrorKind`] classifies every subsystem error for HTTP surfacing
//! and retry decisions.

pub mod error;
pub mod id;
pub mod refs;

pub use error::ErrorKind;
pub use id::{AgentId, ApprovalId, ArtifactId, FileId, OrganizationId, WorkflowId};
pub use refs::{CallId, CallIdParseError, NodeRef, NodeRefError, RunId, RunIdParseError};
