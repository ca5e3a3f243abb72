#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Trace
//!
//! The append-only, per-run sequenced event log:
//!
//! - [`TraceEvent`] / [`NewTraceEvent`] — the event shapes
//! - [`TraceStore`] — persistence contract (`append` assigns a strictly
//!   increasing, gap-free sequence per run)
//! - [`InMemoryTraceStore`] — reference implementation
//! - [`TraceSink`] — append + broadcast subscribe facade
//!
//! Events are projections of executor state transitions, not the source
//! of truth for run status.

pub mod event;
pub mod sink;
pub mod store;

pub use event::{NewTraceEvent, TraceEvent, TraceEventType, TraceLevel};
pub use sink::TraceSink;
pub use store::{InMemoryTraceStore, TraceStore, TraceStoreError};
