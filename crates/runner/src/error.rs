//! Runner errors.

use cascade_core::ErrorKind;
use cascade_component::ComponentError;
use thiserror::Error;

// Exit codes delivered when the kernel or engine killed the process;
// treated as transient infrastructure failures.
const EXIT_OOM_KILLED: i64 = 137;
const EXIT_TERMINATED: i64 = 143;

/// Errors raised while running a single action attempt.
#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    /// The component itself failed.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// The remote endpoint rejected the request (4xx). Never retried.
    #[error("remote endpoint rejected request ({status}): {body}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The remote endpoint failed (5xx) or was unreachable. Retryable.
    #[error("remote endpoint unavailable: {0}")]
    RemoteUnavailable(String),

    /// The container exited non-zero with empty stdout.
    #[error("container exited with code {exit_code}: {stderr}")]
    Container {
        /// Process exit code.
        exit_code: i64,
        /// Captured stderr, truncated.
        stderr: String,
    },

    /// The container engine itself failed.
    #[error("container host: {0}")]
    ContainerHost(String),

    /// The attempt exceeded its deadline.
    #[error("action timed out after {seconds}s")]
    Timeout {
        /// The elapsed deadline.
        seconds: u64,
    },

    /// The run was cancelled mid-attempt.
    #[error("cancelled")]
    Cancelled,

    /// The runner was asked to do something it is not configured for.
    #[error("runner configuration: {0}")]
    Configuration(String),
}

impl RunnerError {
    /// The taxonomy kind, used for retry decisions and surfacing.
    ///
    /// Container exits 137/143 classify as transient (the engine or
    /// kernel killed the process); other non-zero exits are terminal
    /// component failures.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Component(e) => e.kind(),
            Self::RemoteRejected { .. } => ErrorKind::Validation,
            Self::RemoteUnavailable(_) | Self::ContainerHost(_) => ErrorKind::Dependency,
            Self::Container { exit_code, .. } => {
                if matches!(*exit_code, EXIT_OOM_KILLED | EXIT_TERMINATED) {
                    ErrorKind::Dependency
                } else {
                    ErrorKind::Container
                }
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }
}
