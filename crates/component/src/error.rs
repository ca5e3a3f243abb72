//! Component-level error type.

use cascade_core::ErrorKind;

/// Error raised by a component during execution.
///
/// The variant decides the [`ErrorKind`] the runner and executor use
/// for retry and surfacing decisions; components stay unaware of the
/// retry machinery.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ComponentError {
    /// Input failed validation before execution began.
    #[error("validation: {0}")]
    Validation(String),

    /// A required capability or configuration value is absent.
    #[error("configuration: missing `{config_key}`")]
    Configuration {
        /// The capability or config key that was absent.
        config_key: String,
    },

    /// An external dependency was unreachable or misbehaved.
    #[error("dependency: {0}")]
    Dependency(String),

    /// The component exceeded its deadline.
    #[error("timed out after {seconds}s")]
    Timeout {
        /// The deadline that elapsed.
        seconds: u64,
    },

    /// Execution was cancelled via the context's cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl ComponentError {
    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a missing-capability error.
    pub fn missing_capability(config_key: impl Into<String>) -> Self {
        Self::Configuration {
            config_key: config_key.into(),
        }
    }

    /// Shorthand for a dependency error.
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::Dependency(msg.into())
    }

    /// Shorthand for an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Dependency(_) => ErrorKind::Dependency,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the runner may retry this error (before policy filtering).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(
            ComponentError::validation("bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ComponentError::missing_capability("secrets").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            ComponentError::dependency("unreachable").kind(),
            ErrorKind::Dependency
        );
        assert_eq!(
            ComponentError::Timeout { seconds: 30 }.kind(),
            ErrorKind::Timeout
        );
        assert_eq!(ComponentError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn retryability_follows_kind() {
        assert!(ComponentError::dependency("reset").is_retryable());
        assert!(ComponentError::Timeout { seconds: 5 }.is_retryable());
        assert!(!ComponentError::validation("nope").is_retryable());
        assert!(!ComponentError::Cancelled.is_retryable());
    }

    #[test]
    fn display_formatting() {
        assert_eq!(
            ComponentError::missing_capability("storage").to_string(),
            "configuration: missing `storage`"
        );
        assert_eq!(
            ComponentError::Timeout { seconds: 30 }.to_string(),
            "timed out after 30s"
        );
    }
}
