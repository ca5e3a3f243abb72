//! Execute handlers and their outcomes.

use async_trait::async_trait;
use cascade_core::ApprovalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ComponentError;

/// What kind of human input a paused action is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanInputType {
    /// A yes/no decision.
    Approval,
    /// A pick from a set of options.
    Selection,
}

/// Marker returned by a component that needs a human before it can
/// complete. The executor registers the request with the pause/resume
/// coordinator and suspends the action until the matching signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingHumanInput {
    /// Identifier the resolution signal must carry.
    pub request_id: ApprovalId,
    /// Approval or selection.
    pub input_type: HumanInputType,
    /// Short human-facing title.
    pub title: String,
    /// Longer human-facing description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Structured context shown to the approver (options, diffs, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_data: Option<Value>,
    /// Deadline after which the request expires and the action fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_at: Option<DateTime<Utc>>,
}

/// Result of one component execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComponentOutcome {
    /// The component finished and produced its outputs.
    Completed {
        /// Output values keyed by output port id.
        output: Value,
    },
    /// The component suspended on human input.
    PendingHumanInput(PendingHumanInput),
}

impl ComponentOutcome {
    /// Shorthand for a completed outcome.
    #[must_use]
    pub fn completed(output: Value) -> Self {
        Self::Completed { output }
    }

    /// The completed output, if this outcome is terminal.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        match self {
            Self::Completed { output } => Some(output),
            Self::PendingHumanInput(_) => None,
        }
    }
}

/// The execute capability of a component.
///
/// `input` carries resolved action-bound values, `params` the
/// config-bound values. Handlers check the context for the capabilities
/// they need and fail with `ComponentError::Configuration` when a
/// required one is absent.
#[async_trait]
pub trait ComponentHandler: Send + Sync + 'static {
    /// Execute the component.
    async fn execute(
        &self,
        input: Value,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, ComponentError>;
}

/// Blanket support for closures as handlers in tests and built-ins.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ComponentHandler for FnHandler<F>
where
    F: Fn(Value, Value) -> Result<ComponentOutcome, ComponentError> + Send + Sync + 'static,
{
    async fn execute(
        &self,
        input: Value,
        params: Value,
        _ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, ComponentError> {
        (self.0)(input, params)
    }
}

/// Helpers shared by unit tests across crates.
pub mod test_support {
    use std::sync::Arc;

    use super::{ComponentHandler, ComponentOutcome, FnHandler};

    /// A handler that completes with an empty object.
    #[must_use]
    pub fn noop_handler() -> Arc<dyn ComponentHandler> {
        Arc::new(FnHandler(|_input, _params| {
            Ok(ComponentOutcome::completed(serde_json::json!({})))
        }))
    }

    /// A handler that echoes its input as output.
    #[must_use]
    pub fn echo_handler() -> Arc<dyn ComponentHandler> {
        Arc::new(FnHandler(|input, _params| {
            Ok(ComponentOutcome::completed(input))
        }))
    }
}
