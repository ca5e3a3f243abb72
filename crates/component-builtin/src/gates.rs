//! Human-in-the-loop gates.

use std::sync::Arc;

use cascade_core::ApprovalId;
use cascade_component::{
    Category, ComponentDefinition, ComponentError, ComponentOutcome, ConnectionType, FnHandler,
    HumanInputType, ObjectSchema, PendingHumanInput, PortDecl, Primitive,
};
use chrono::{Duration, Utc};
use serde_json::Value;

fn timeout_at(params: &Value) -> Option<chrono::DateTime<Utc>> {
    params
        .get("timeoutSeconds")
        .and_then(Value::as_u64)
        .map(|secs| Utc::now() + Duration::seconds(secs as i64))
}

/// Suspends the run until a human approves or rejects.
#[must_use]
pub fn approval_gate() -> ComponentDefinition {
    let handler = Arc::new(FnHandler(|_input: Value, params: Value| {
        let title = params
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ComponentError::validation("title parameter is required"))?
            .to_owned();
        Ok(ComponentOutcome::PendingHumanInput(PendingHumanInput {
            request_id: ApprovalId::v4(),
            input_type: HumanInputType::Approval,
            title,
            description: params
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_owned),
            context_data: params.get("context").cloned(),
            timeout_at: timeout_at(&params),
        }))
    }));

    ComponentDefinition::new(
        "approval.gate",
        "Approval Gate",
        Category::Interaction,
        handler,
    )
    .with_inputs(
        ObjectSchema::new()
            .with(PortDecl::action("payload", "Payload", ConnectionType::Any).optional()),
    )
    .with_parameters(
        ObjectSchema::new()
            .with(PortDecl::config(
                "title",
                "Title",
                ConnectionType::primitive(Primitive::Text),
            ))
            .with(
                PortDecl::config(
                    "description",
                    "Description",
                    ConnectionType::primitive(Primitive::Text),
                )
                .optional(),
            )
            .with(
                PortDecl::config(
                    "timeoutSeconds",
                    "Timeout",
                    ConnectionType::primitive(Primitive::Number),
                )
                .optional(),
            ),
    )
    .with_outputs(
        ObjectSchema::new()
            .with(PortDecl::action(
                "approved",
                "Approved",
                ConnectionType::primitive(Primitive::Boolean),
            ))
            .with(
                PortDecl::action(
                    "responseNote",
                    "Response Note",
                    ConnectionType::primitive(Primitive::Text),
                )
                .optional(),
            ),
    )
}

/// Suspends the run until a human picks from the configured options.
#[must_use]
pub fn manual_select() -> ComponentDefinition {
    let handler = Arc::new(FnHandler(|_input: Value, params: Value| {
        let title = params
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Select an option")
            .to_owned();
        let options = params
            .get("options")
            .cloned()
            .ok_or_else(|| ComponentError::validation("options parameter is required"))?;
        Ok(ComponentOutcome::PendingHumanInput(PendingHumanInput {
            request_id: ApprovalId::v4(),
            input_type: HumanInputType::Selection,
            title,
            description: None,
            context_data: Some(serde_json::json!({ "options": options })),
            timeout_at: timeout_at(&params),
        }))
    }));

    ComponentDefinition::new(
        "manual.select",
        "Manual Selection",
        Category::Interaction,
        handler,
    )
    .with_inputs(
        ObjectSchema::new()
            .with(PortDecl::action("payload", "Payload", ConnectionType::Any).optional()),
    )
    .with_parameters(
        ObjectSchema::new()
            .with(
                PortDecl::config("title", "Title", ConnectionType::primitive(Primitive::Text))
                    .optional(),
            )
            .with(PortDecl::config(
                "options",
                "Options",
                ConnectionType::List {
                    item: Box::new(ConnectionType::primitive(Primitive::Json)),
                },
            )),
    )
    .with_outputs(ObjectSchema::new().with(PortDecl::action(
        "selection",
        "Selection",
        ConnectionType::Any,
    )))
}
