//! The system-wide error taxonomy.
//!
//! Every subsystem's error enum maps onto one of these kinds via a
//! `kind()` accessor. The kind decides HTTP surfacing and whether the
//! runner may retry; the enums themselves stay crate-local.

use serde::{Deserialize, Serialize};

/// Classification of an error for surfacing and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema rejection, unknown component, malformed input. Never retried.
    Validation,
    /// Missing or invalid credentials on a guarded path.
    Authentication,
    /// Authenticated but not permitted.
    Authorization,
    /// Referenced entity does not exist.
    NotFound,
    /// State conflict, e.g. an approval already resolved.
    Conflict,
    /// Missing capability or environment value. Non-retryable.
    Configuration,
    /// External service unreachable. Transient, retryable.
    Dependency,
    /// Container runner failure.
    Container,
    /// Deadline exceeded. Retryable up to the policy limit.
    Timeout,
    /// Terminal cancellation. Never retried.
    Cancelled,
    /// Anything else; surfaced as an internal error.
    Internal,
}

impl ErrorKind {
    /// Whether the runner may retry an error of this kind by default.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Dependency | Self::Timeout)
    }

    /// The HTTP status this kind surfaces as.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Timeout => 408,
            Self::Dependency => 502,
            Self::Configuration | Self::Container | Self::Cancelled | Self::Internal => 500,
        }
    }

    /// Stable machine-readable name, as used in `non_retryable_error_kinds`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Configuration => "configuration",
            Self::Dependency => "dependency",
            Self::Container => "container",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Dependency.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());

        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Configuration.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::Conflict.is_retryable());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorKind::Validation.http_status(), 400);
        assert_eq!(ErrorKind::Authentication.http_status(), 401);
        assert_eq!(ErrorKind::Authorization.http_status(), 403);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
        assert_eq!(ErrorKind::Configuration.http_status(), 500);
        assert_eq!(ErrorKind::Dependency.http_status(), 502);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        let back: ErrorKind = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(back, ErrorKind::Timeout);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(ErrorKind::Container.to_string(), "container");
        assert_eq!(ErrorKind::Cancelled.to_string(), "cancelled");
    }
}
