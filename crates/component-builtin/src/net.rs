//! IP reachability check — the reference agent tool.

use std::net::IpAddr;
use std::sync::Arc;

use cascade_component::{
    AgentToolDecl, Category, ComponentDefinition, ComponentError, ComponentOutcome,
    ConnectionType, FnHandler, ObjectSchema, PortDecl, Primitive,
};
use serde_json::Value;

/// Validates and classifies an IP address. Announced to agents as the
/// `ip_check` tool; its `apiKey` credential port is resolved from the
/// tool registry, never from agent arguments.
#[must_use]
pub fn ip_check() -> ComponentDefinition {
    let handler = Arc::new(FnHandler(|input: Value, params: Value| {
        let raw = input
            .get("ipAddress")
            .and_then(Value::as_str)
            .or_else(|| params.get("ipAddress").and_then(Value::as_str))
            .ok_or_else(|| ComponentError::validation("ipAddress is required"))?;
        let parsed: IpAddr = raw
            .parse()
            .map_err(|_| ComponentError::validation(format!("not an IP address: {raw}")))?;

        Ok(ComponentOutcome::completed(serde_json::json!({
            "ipAddress": parsed.to_string(),
            "version": if parsed.is_ipv4() { 4 } else { 6 },
            "isLoopback": parsed.is_loopback(),
            "isPrivate": match parsed {
                IpAddr::V4(v4) => v4.is_private(),
                IpAddr::V6(_) => false,
            },
        })))
    }));

    ComponentDefinition::new("net.ip_check", "IP Check", Category::Scanner, handler)
        .with_inputs(
            ObjectSchema::new()
                .with(
                    PortDecl::action(
                        "ipAddress",
                        "IP Address",
                        ConnectionType::primitive(Primitive::Text),
                    )
                    .with_description("address to classify"),
                )
                .with(PortDecl::credential("apiKey", "API Key")),
        )
        .with_parameters(ObjectSchema::new().with(
            PortDecl::config(
                "strict",
                "Strict",
                ConnectionType::primitive(Primitive::Boolean),
            )
            .with_default(serde_json::json!(false)),
        ))
        .with_outputs(
            ObjectSchema::new()
                .with(PortDecl::action(
                    "ipAddress",
                    "IP Address",
                    ConnectionType::primitive(Primitive::Text),
                ))
                .with(PortDecl::action(
                    "version",
                    "Version",
                    ConnectionType::primitive(Primitive::Number),
                )),
        )
        .with_agent_tool(AgentToolDecl {
            tool_name: "ip_check".into(),
            description: "Classify an IP address (version, loopback, private range)".into(),
            expose_params: vec!["strict".into()],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_component::{BindingType, ExecutionContext};
    use cascade_core::{NodeRef, RunId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(RunId::generate(), NodeRef::new("check").unwrap())
    }

    #[tokio::test]
    async fn classifies_ipv4() {
        let def = ip_check();
        let outcome = def
            .handler
            .execute(json!({"ipAddress": "10.0.0.1"}), json!({}), &ctx())
            .await
            .unwrap();
        let output = outcome.output().unwrap();
        assert_eq!(output["version"], json!(4));
        assert_eq!(output["isPrivate"], json!(true));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let def = ip_check();
        let err = def
            .handler
            .execute(json!({"ipAddress": "not-an-ip"}), json!({}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::Validation(_)));
    }

    #[test]
    fn credential_port_is_never_in_tool_schema() {
        let def = ip_check();
        let schema = def.input_schema.json_schema();
        assert!(schema["properties"].get("apiKey").is_none());
        assert_eq!(def.binding_of("apiKey"), Some(BindingType::Credential));
    }

    #[test]
    fn announced_as_agent_tool() {
        let def = ip_check();
        let tool = def.agent_tool.unwrap();
        assert_eq!(tool.tool_name, "ip_check");
        assert_eq!(tool.expose_params, vec!["strict"]);
    }
}
