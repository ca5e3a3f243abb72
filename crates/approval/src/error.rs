//! Approval errors.

use cascade_core::{ApprovalId, ErrorKind};
use thiserror::Error;

use crate::request::ApprovalStatus;

/// Errors raised by the pause/resume coordinator and its store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApprovalError {
    /// No record with the given id.
    #[error("approval not found: {id}")]
    NotFound {
        /// The missing id.
        id: ApprovalId,
    },

    /// No record matches the presented token, or it is already resolved.
    /// Unknown and resolved are deliberately indistinguishable on the
    /// public link path.
    #[error("approval token does not resolve")]
    TokenNotFound,

    /// The record already left `pending`.
    #[error("approval {id} already {status}")]
    AlreadyResolved {
        /// The record id.
        id: ApprovalId,
        /// Its terminal status.
        status: ApprovalStatus,
    },

    /// The deadline passed; the record transitioned to `expired`.
    #[error("approval {id} expired")]
    Expired {
        /// The record id.
        id: ApprovalId,
    },
}

impl ApprovalError {
    /// Taxonomy kind for HTTP surfacing.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::TokenNotFound => ErrorKind::NotFound,
            Self::AlreadyResolved { .. } | Self::Expired { .. } => ErrorKind::Conflict,
        }
    }
}
