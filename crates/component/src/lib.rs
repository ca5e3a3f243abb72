#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Component
//!
//! Component definitions and the seams they execute against:
//!
//! - [`ComponentDefinition`] — immutable record: schemas, runner spec,
//!   retry policy, optional agent-tool announcement, execute handler
//! - [`ComponentRegistry`] — process-wide id → definition map
//! - [`ExecutionContext`] — per-action capability bundle (storage,
//!   secrets, artifacts, HTTP, progress)
//! - [`ComponentHandler`] / [`ComponentOutcome`] — the execute seam,
//!   including the [`PendingHumanInput`] suspension marker
//!
//! Individual security-tool components are plugins that consume these
//! types; they do not live in this workspace.

pub mod context;
pub mod definition;
pub mod error;
pub mod handler;
pub mod registry;
pub mod retry;
pub mod schema;

pub use context::{
    ArtifactUpload, ArtifactsCapability, ExecutionContext, HttpCapability, ProgressLevel,
    ProgressSink, ProgressUpdate, SecretValue, SecretsCapability, StorageCapability, StoredFile,
};
pub use definition::{AgentToolDecl, Category, ComponentDefinition, RunnerSpec};
pub use error::ComponentError;
pub use handler::{
    ComponentHandler, ComponentOutcome, FnHandler, HumanInputType, PendingHumanInput,
};
pub use registry::{ComponentRegistry, DuplicateId};
pub use retry::RetryPolicy;
pub use schema::{BindingType, ConnectionType, ObjectSchema, PortDecl, Primitive};
