//! HTTP error surfacing.
//!
//! Every subsystem error carries a taxonomy kind; this module maps the
//! kind to a status code and renders a stable JSON body:
//! `{"error": {"kind", "code"?, "message", ...}}`. Messages never carry
//! stack traces or secret material.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cascade_core::ErrorKind;
use serde_json::{Value, json};

/// An error ready to be rendered as an HTTP response.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// Taxonomy kind; decides the status code.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable discriminant (e.g. `UnknownComponent`).
    pub code: Option<&'static str>,
    /// Structured details merged into the body.
    pub details: Option<Value>,
}

impl ApiError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            details: None,
        }
    }

    /// A 404.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// A 400.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// A 401.
    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Authentication, "authentication required")
    }

    /// A 403.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// A 500 configuration failure.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Attach a machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "kind": self.kind,
            "message": self.message,
        });
        if let Some(code) = self.code {
            body["code"] = json!(code);
        }
        if let (Some(details), Some(obj)) = (self.details, body.as_object_mut()) {
            obj.insert("details".into(), details);
        }
        (status, Json(json!({ "error": body }))).into_response()
    }
}

impl From<cascade_compiler::CompileError> for ApiError {
    fn from(err: cascade_compiler::CompileError) -> Self {
        let code = err.code();
        let details = match &err {
            cascade_compiler::CompileError::UnknownComponent {
                node_id,
                component_id,
            } => Some(json!({ "nodeId": node_id, "componentId": component_id })),
            cascade_compiler::CompileError::AmbiguousTrigger { node_ids }
            | cascade_compiler::CompileError::CycleDetected { node_ids } => {
                Some(json!({ "nodeIds": node_ids }))
            }
            cascade_compiler::CompileError::MissingBinding { node_id, input_id } => {
                Some(json!({ "nodeId": node_id, "inputId": input_id }))
            }
            _ => None,
        };
        let mut api = Self::new(err.kind(), err.to_string()).with_code(code);
        if let Some(details) = details {
            api = api.with_details(details);
        }
        api
    }
}

impl From<cascade_workflow::WorkflowStoreError> for ApiError {
    fn from(err: cascade_workflow::WorkflowStoreError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<cascade_executor::ExecutorError> for ApiError {
    fn from(err: cascade_executor::ExecutorError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<cascade_executor::RunStoreError> for ApiError {
    fn from(err: cascade_executor::RunStoreError) -> Self {
        match &err {
            cascade_executor::RunStoreError::NotFound { .. } => {
                Self::new(ErrorKind::NotFound, err.to_string())
            }
            cascade_executor::RunStoreError::Backend(_) => {
                Self::new(ErrorKind::Internal, err.to_string())
            }
        }
    }
}

impl From<cascade_approval::ApprovalError> for ApiError {
    fn from(err: cascade_approval::ApprovalError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<cascade_gateway::GatewayError> for ApiError {
    fn from(err: cascade_gateway::GatewayError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<cascade_trace::TraceStoreError> for ApiError {
    fn from(err: cascade_trace::TraceStoreError) -> Self {
        Self::new(ErrorKind::Internal, err.to_string())
    }
}
