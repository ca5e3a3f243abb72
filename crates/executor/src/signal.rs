//! Signals delivered to a running workflow.
//!
//! Signals for the same run are processed strictly in receipt order by
//! the run's single executor task.

use cascade_approval::HumanInputResolution;
use cascade_core::{CallId, NodeRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An agent tool invocation forwarded into the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    /// `{run}:{node}:{millis}`; idempotency key for the dispatch.
    pub call_id: CallId,
    /// The node whose component is being invoked.
    pub node_id: NodeRef,
    /// The component to execute.
    pub component_id: String,
    /// Agent-supplied action arguments.
    pub arguments: Value,
    /// Compile-time bound parameters, with agent overrides applied.
    pub parameters: Value,
    /// Decrypted credentials, when the tool carries any. Never sourced
    /// from the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    /// When the gateway accepted the call.
    pub requested_at: DateTime<Utc>,
}

/// The stored envelope answered to `getToolCallResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Whether the dispatch completed without error.
    pub success: bool,
    /// The component's output, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// The error message, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    /// A successful envelope.
    #[must_use]
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    /// A failed envelope.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Signals accepted by a running workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum RunSignal {
    /// Dispatch a component with agent-supplied arguments.
    ExecuteToolCall(ToolCallRequest),
    /// Observational: a gateway-side tool call finished.
    #[serde(rename_all = "camelCase")]
    ToolCallCompleted {
        /// The node whose tool completed.
        node_ref: NodeRef,
        /// Agent-visible tool name.
        tool_name: String,
        /// Output on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        /// Error message on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        /// Terminal status string (`completed` / `failed`).
        status: String,
    },
    /// A human resolved a pending approval or selection.
    HumanInputResolved(HumanInputResolution),
    /// Cancel the run.
    Cancel,
}
