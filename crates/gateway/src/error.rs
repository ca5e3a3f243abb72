//! Gateway errors.

use cascade_core::{ErrorKind, RunId};
use thiserror::Error;

/// Errors raised by the tool registry, session store, and MCP gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The key-value store failed.
    #[error("kv store: {0}")]
    Kv(String),

    /// The master key is malformed or missing.
    #[error("credential sealing: {0}")]
    Sealing(String),

    /// Stored credentials failed to decrypt. Fatal: the registry never
    /// serves a tool whose credentials it cannot open.
    #[error("credential decryption failed for run {run_id} node {node_id}")]
    DecryptionFailed {
        /// The owning run.
        run_id: RunId,
        /// The tool's node.
        node_id: String,
    },

    /// No tool is registered under the given key.
    #[error("tool not found: {run_id}/{node_id}")]
    ToolNotFound {
        /// The owning run.
        run_id: RunId,
        /// The missing node.
        node_id: String,
    },

    /// The session token is unknown or expired.
    #[error("session token does not resolve")]
    SessionNotFound,

    /// The run does not exist.
    #[error("run not found: {run_id}")]
    RunNotFound {
        /// The missing run.
        run_id: RunId,
    },

    /// The token's organization does not match the run's.
    #[error("session is not permitted to access run {run_id}")]
    Forbidden {
        /// The denied run.
        run_id: RunId,
    },

    /// An upstream MCP source failed after retries.
    #[error("external tool source unavailable: {0}")]
    Upstream(String),

    /// The workflow bridge rejected a signal or query.
    #[error(transparent)]
    Bridge(#[from] cascade_executor::ExecutorError),
}

impl GatewayError {
    /// Taxonomy kind for HTTP surfacing.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kv(_) | Self::Sealing(_) | Self::DecryptionFailed { .. } => {
                ErrorKind::Configuration
            }
            Self::ToolNotFound { .. } | Self::RunNotFound { .. } => ErrorKind::NotFound,
            Self::SessionNotFound => ErrorKind::Authentication,
            Self::Forbidden { .. } => ErrorKind::Authorization,
            Self::Upstream(_) => ErrorKind::Dependency,
            Self::Bridge(e) => e.kind(),
        }
    }
}
