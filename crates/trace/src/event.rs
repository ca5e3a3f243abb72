//! Trace event types.

use cascade_core::{NodeRef, RunId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceEventType {
    /// An action began executing.
    NodeStarted,
    /// An action reported intermediate progress.
    NodeProgress,
    /// An action finished successfully.
    NodeCompleted,
    /// An action failed.
    NodeFailed,
    /// An action was skipped.
    NodeSkipped,
    /// An action suspended on human input.
    AwaitingInput,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NodeStarted => "NODE_STARTED",
            Self::NodeProgress => "NODE_PROGRESS",
            Self::NodeCompleted => "NODE_COMPLETED",
            Self::NodeFailed => "NODE_FAILED",
            Self::NodeSkipped => "NODE_SKIPPED",
            Self::AwaitingInput => "AWAITING_INPUT",
        };
        f.write_str(s)
    }
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    #[default]
    Info,
    /// Degraded but continuing.
    Warn,
    /// Failure.
    Error,
}

/// An event as submitted by a producer; the store assigns `sequence`
/// and `timestamp` at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTraceEvent {
    /// The run this event belongs to.
    pub run_id: RunId,
    /// The workflow, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    /// Event type.
    pub r#type: TraceEventType,
    /// The action the event concerns.
    pub node_ref: NodeRef,
    /// Severity.
    #[serde(default)]
    pub level: TraceLevel,
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error message — never a stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Summary of the action's outputs, for completed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<Value>,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl NewTraceEvent {
    /// A minimal event of the given type.
    #[must_use]
    pub fn new(run_id: RunId, r#type: TraceEventType, node_ref: NodeRef) -> Self {
        Self {
            run_id,
            workflow_id: None,
            r#type,
            node_ref,
            level: TraceLevel::default(),
            message: None,
            error: None,
            output_summary: None,
            data: None,
        }
    }

    /// Attach the workflow id.
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the severity.
    #[must_use]
    pub fn with_level(mut self, level: TraceLevel) -> Self {
        self.level = level;
        self
    }

    /// Attach an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.level = TraceLevel::Error;
        self
    }

    /// Attach an output summary.
    #[must_use]
    pub fn with_output_summary(mut self, summary: Value) -> Self {
        self.output_summary = Some(summary);
        self
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A stored trace event with its per-run sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    /// Per-run sequence; strictly increasing, gap-free.
    pub sequence: u64,
    /// When the event was appended.
    pub timestamp: DateTime<Utc>,
    /// The submitted event body.
    #[serde(flatten)]
    pub body: NewTraceEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn type_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&TraceEventType::NodeStarted).unwrap(),
            "\"NODE_STARTED\""
        );
        assert_eq!(
            serde_json::to_string(&TraceEventType::AwaitingInput).unwrap(),
            "\"AWAITING_INPUT\""
        );
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(TraceEventType::NodeFailed.to_string(), "NODE_FAILED");
    }

    #[test]
    fn default_level_is_info() {
        let event = NewTraceEvent::new(
            RunId::generate(),
            TraceEventType::NodeStarted,
            NodeRef::new("a").unwrap(),
        );
        assert_eq!(event.level, TraceLevel::Info);
    }

    #[test]
    fn with_error_raises_level() {
        let event = NewTraceEvent::new(
            RunId::generate(),
            TraceEventType::NodeFailed,
            NodeRef::new("a").unwrap(),
        )
        .with_error("boom");
        assert_eq!(event.level, TraceLevel::Error);
        assert_eq!(event.error.as_deref(), Some("boom"));
    }

    #[test]
    fn stored_event_flattens_body() {
        let event = TraceEvent {
            sequence: 3,
            timestamp: Utc::now(),
            body: NewTraceEvent::new(
                RunId::generate(),
                TraceEventType::NodeCompleted,
                NodeRef::new("loader").unwrap(),
            )
            .with_output_summary(serde_json::json!({"fileName": "x.txt"})),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sequence"], serde_json::json!(3));
        assert_eq!(json["type"], serde_json::json!("NODE_COMPLETED"));
        assert_eq!(json["nodeRef"], serde_json::json!("loader"));
        assert_eq!(json["outputSummary"]["fileName"], serde_json::json!("x.txt"));
    }

    #[test]
    fn serde_roundtrip() {
        let event = TraceEvent {
            sequence: 1,
            timestamp: Utc::now(),
            body: NewTraceEvent::new(
                RunId::generate(),
                TraceEventType::NodeProgress,
                NodeRef::new("scan").unwrap(),
            )
            .with_message("50 hosts probed")
            .with_data(serde_json::json!({"done": 50})),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: TraceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 1);
        assert_eq!(back.body.message.as_deref(), Some("50 hosts probed"));
    }
}
