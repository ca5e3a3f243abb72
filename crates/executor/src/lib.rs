#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Executor
//!
//! Drives compiled action plans through a durable-style runtime:
//!
//! - [`WorkflowExecutor`] — the run body: executes actions in plan
//!   order, merges outputs into successor inputs via bindings, pauses
//!   on human input, services tool-call signals, journals every
//!   transition through the run store and trace sink
//! - [`RunSignal`] — `executeToolCall`, `toolCallCompleted`,
//!   `humanInputResolved`, `cancel`; processed strictly in receipt
//!   order per run
//! - [`WorkflowRuntime`] / [`LocalRuntime`] — the durability seam and
//!   its in-process implementation (a Temporal adapter implements the
//!   same trait)
//! - [`ToolCallBridge`] — the signal/query surface the MCP gateway
//!   dispatches through
//!
//! Tool-call results are retained for the longer of the gateway poll
//! window and five minutes, then pruned.

pub mod error;
pub mod executor;
pub mod router;
pub mod run;
pub mod runtime;
pub mod signal;
pub mod toolcall;

pub use error::ExecutorError;
pub use executor::{ArtifactsFactory, CapabilitySet, ExecutorDeps, RunScope, WorkflowExecutor};
pub use router::SignalRouter;
pub use run::{ActionState, InMemoryRunStore, RunRecord, RunStatus, RunStore, RunStoreError};
pub use runtime::{LocalRuntime, ToolCallBridge, WorkflowRuntime};
pub use signal::{RunSignal, ToolCallRequest, ToolCallResult};
pub use toolcall::{RESULT_RETENTION, ToolCallResults};
