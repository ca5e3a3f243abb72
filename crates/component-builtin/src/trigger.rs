//! The manual trigger.

use std::sync::Arc;

use cascade_component::{
    Category, ComponentDefinition, ComponentOutcome, ConnectionType, FnHandler, ObjectSchema,
    PortDecl,
};

/// Entry point for manually started runs. Echoes the run inputs as its
/// `payload` output so downstream actions can bind to them.
#[must_use]
pub fn manual_trigger() -> ComponentDefinition {
    let handler = Arc::new(FnHandler(|input, _params| {
        Ok(ComponentOutcome::completed(serde_json::json!({
            "payload": input
        })))
    }));

    ComponentDefinition::new("manual.trigger", "Manual Trigger", Category::Trigger, handler)
        .with_outputs(ObjectSchema::new().with(
            PortDecl::action("payload", "Payload", ConnectionType::Any)
                .with_description("run inputs, passed through"),
        ))
}
