#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Approval
//!
//! Pause/resume for running workflows: approval and selection requests
//! that suspend an action until a human decides.
//!
//! - [`ApprovalRequest`] — the durable record; transitions out of
//!   `pending` exactly once
//! - [`ResolutionToken`] — ≥128-bit tokens, constant-time compared,
//!   never logged; one minted for approve and one for reject
//! - [`PauseResumeCoordinator`] — create / resolve / resolve-by-token /
//!   cancel, with the `humanInputResolved` signal delivered through
//!   [`HumanInputNotifier`]
//!
//! The record is the source of truth; signal delivery failures never
//! roll it back.

pub mod coordinator;
pub mod error;
pub mod request;
pub mod store;
pub mod token;

pub use coordinator::{HumanInputNotifier, MintedTokens, PauseResumeCoordinator};
pub use error::ApprovalError;
pub use request::{
    ApprovalRequest, ApprovalStatus, Decision, HumanInputResolution, NewApprovalRequest,
};
pub use store::{ApprovalStore, InMemoryApprovalStore, TokenKind};
pub use token::ResolutionToken;
