#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Runner
//!
//! Executes a single action under one of three strategies selected by
//! the component's runner spec:
//!
//! - **inline** — the handler runs in the worker task under a deadline;
//! - **container** — the image runs against an isolated tenant+run
//!   scoped scratch volume via [`ContainerHost`] (Docker through
//!   [`BollardHost`]), with the partial-results policy for tools that
//!   emit findings before exiting non-zero;
//! - **remote** — params are POSTed to an HTTP endpoint with bearer
//!   auth resolved through the secrets capability.
//!
//! [`ActionRunner::run_with_retry`] applies the component's retry
//! policy: exponential backoff, non-retryable kinds, cancellation
//! between attempts.

pub mod container;
pub mod error;
pub mod remote;
pub mod runner;

pub use container::{BollardHost, ContainerHost, ContainerRunResult, ContainerRunSpec};
pub use error::RunnerError;
pub use runner::ActionRunner;
