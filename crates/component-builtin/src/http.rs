//! The HTTP request component.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_component::{
    Category, ComponentDefinition, ComponentError, ComponentHandler, ComponentOutcome,
    ConnectionType, ExecutionContext, ObjectSchema, PortDecl, Primitive,
};
use serde_json::Value;

struct HttpRequestHandler;

#[async_trait]
impl ComponentHandler for HttpRequestHandler {
    async fn execute(
        &self,
        input: Value,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, ComponentError> {
        let url = input
            .get("url")
            .or_else(|| params.get("url"))
            .and_then(Value::as_str)
            .ok_or_else(|| ComponentError::validation("url is required"))?;
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET");

        let http = ctx.http()?;
        let body = match method {
            "GET" => http.get_json(url).await?,
            "POST" => {
                let payload = input.get("body").cloned().unwrap_or(Value::Null);
                http.post_json(url, &payload).await?
            }
            other => {
                return Err(ComponentError::validation(format!(
                    "unsupported method: {other}"
                )));
            }
        };

        Ok(ComponentOutcome::completed(serde_json::json!({
            "body": body
        })))
    }
}

/// Calls an external HTTP API through the context's HTTP capability.
#[must_use]
pub fn http_request() -> ComponentDefinition {
    ComponentDefinition::new(
        "http.request",
        "HTTP Request",
        Category::Integration,
        Arc::new(HttpRequestHandler),
    )
    .with_inputs(
        ObjectSchema::new()
            .with(
                PortDecl::action("url", "URL", ConnectionType::primitive(Primitive::Text))
                    .optional(),
            )
            .with(PortDecl::action("body", "Body", ConnectionType::Any).optional()),
    )
    .with_parameters(
        ObjectSchema::new()
            .with(
                PortDecl::config("url", "URL", ConnectionType::primitive(Primitive::Text))
                    .optional(),
            )
            .with(
                PortDecl::config("method", "Method", ConnectionType::primitive(Primitive::Text))
                    .with_default(serde_json::json!("GET")),
            ),
    )
    .with_outputs(ObjectSchema::new().with(PortDecl::action("body", "Body", ConnectionType::Any)))
}
