//! Port schemas and connection typing.
//!
//! Components declare their inputs, parameters, and outputs as port
//! schemas. The compiler uses these to resolve bindings; the gateway
//! uses them to partition agent-supplied arguments and to derive JSON
//! Schemas for announced tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a port is bound at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingType {
    /// Wired from an upstream action output or supplied by an agent call.
    Action,
    /// Resolved from stored credentials; never exposed to agents.
    Credential,
    /// Fixed at compile time from the node's configuration.
    Config,
}

/// Primitive value types carried on ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// UTF-8 text.
    Text,
    /// Double-precision number.
    Number,
    /// Boolean flag.
    Boolean,
    /// Secret string; redacted in traces and logs.
    Secret,
    /// Arbitrary JSON value.
    Json,
    /// Reference to a stored file.
    File,
}

/// The type carried across a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionType {
    /// A single primitive value.
    Primitive {
        /// The primitive variant.
        primitive: Primitive,
    },
    /// A homogeneous list.
    List {
        /// Element type.
        item: Box<ConnectionType>,
    },
    /// A string-keyed map.
    Map {
        /// Value type.
        value: Box<ConnectionType>,
    },
    /// A named structural contract between components.
    Contract {
        /// Contract name, e.g. `"target_list"`.
        name: String,
        /// Whether the contract carries credential material.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        credential: bool,
    },
    /// Accepts anything.
    Any,
}

impl ConnectionType {
    /// Shorthand for a primitive connection type.
    #[must_use]
    pub fn primitive(primitive: Primitive) -> Self {
        Self::Primitive { primitive }
    }

    /// Whether values of this type must be treated as secret.
    #[must_use]
    pub fn is_secret(&self) -> bool {
        match self {
            Self::Primitive { primitive } => *primitive == Primitive::Secret,
            Self::List { item } => item.is_secret(),
            Self::Map { value } => value.is_secret(),
            Self::Contract { credential, .. } => *credential,
            Self::Any => false,
        }
    }

    /// Render this type as a JSON Schema fragment for tool announcements.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        match self {
            Self::Primitive { primitive } => match primitive {
                Primitive::Text | Primitive::Secret => serde_json::json!({"type": "string"}),
                Primitive::Number => serde_json::json!({"type": "number"}),
                Primitive::Boolean => serde_json::json!({"type": "boolean"}),
                Primitive::Json => serde_json::json!({}),
                Primitive::File => {
                    serde_json::json!({"type": "string", "description": "file id"})
                }
            },
            Self::List { item } => serde_json::json!({
                "type": "array",
                "items": item.json_schema(),
            }),
            Self::Map { value } => serde_json::json!({
                "type": "object",
                "additionalProperties": value.json_schema(),
            }),
            Self::Contract { name, .. } => serde_json::json!({
                "type": "object",
                "description": format!("contract: {name}"),
            }),
            Self::Any => serde_json::json!({}),
        }
    }
}

/// A single declared port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDecl {
    /// Port identifier, unique within its schema.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// How this port is bound.
    pub binding: BindingType,
    /// The value type carried on this port.
    pub connection: ConnectionType,
    /// Whether the compiler must see this port satisfied.
    #[serde(default)]
    pub required: bool,
    /// Default value used when no edge or config entry supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Short description, surfaced in tool schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PortDecl {
    /// Create a required action-bound port.
    pub fn action(id: impl Into<String>, label: impl Into<String>, connection: ConnectionType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            binding: BindingType::Action,
            connection,
            required: true,
            default: None,
            description: None,
        }
    }

    /// Create a config-bound port.
    pub fn config(id: impl Into<String>, label: impl Into<String>, connection: ConnectionType) -> Self {
        Self {
            binding: BindingType::Config,
            ..Self::action(id, label, connection)
        }
    }

    /// Create a credential-bound port.
    pub fn credential(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            binding: BindingType::Credential,
            connection: ConnectionType::primitive(Primitive::Secret),
            ..Self::action(id, label, ConnectionType::Any)
        }
    }

    /// Mark the port optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Attach a default value (implies the port is satisfiable without a binding).
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An ordered set of port declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    /// Declared ports, in declaration order.
    pub ports: Vec<PortDecl>,
}

impl ObjectSchema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port.
    #[must_use]
    pub fn with(mut self, port: PortDecl) -> Self {
        self.ports.push(port);
        self
    }

    /// Look up a port by id.
    #[must_use]
    pub fn port(&self, id: &str) -> Option<&PortDecl> {
        self.ports.iter().find(|p| p.id == id)
    }

    /// Iterate ports that the compiler must see satisfied.
    pub fn required_ports(&self) -> impl Iterator<Item = &PortDecl> {
        self.ports.iter().filter(|p| p.required)
    }

    /// Render the schema as a JSON Schema object.
    ///
    /// Credential-bound ports are omitted entirely — they must never be
    /// visible to agents.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for port in &self.ports {
            if port.binding == BindingType::Credential {
                continue;
            }
            let mut fragment = port.connection.json_schema();
            if let (Some(desc), Some(obj)) = (&port.description, fragment.as_object_mut()) {
                obj.insert("description".into(), Value::String(desc.clone()));
            }
            properties.insert(port.id.clone(), fragment);
            if port.required {
                required.push(Value::String(port.id.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn primitive_schemas() {
        assert_eq!(
            ConnectionType::primitive(Primitive::Text).json_schema(),
            serde_json::json!({"type": "string"})
        );
        assert_eq!(
            ConnectionType::primitive(Primitive::Number).json_schema(),
            serde_json::json!({"type": "number"})
        );
    }

    #[test]
    fn list_and_map_schemas() {
        let list = ConnectionType::List {
            item: Box::new(ConnectionType::primitive(Primitive::Text)),
        };
        assert_eq!(
            list.json_schema(),
            serde_json::json!({"type": "array", "items": {"type": "string"}})
        );

        let map = ConnectionType::Map {
            value: Box::new(ConnectionType::primitive(Primitive::Number)),
        };
        assert_eq!(
            map.json_schema(),
            serde_json::json!({"type": "object", "additionalProperties": {"type": "number"}})
        );
    }

    #[test]
    fn secrecy_propagates_through_containers() {
        let secret_list = ConnectionType::List {
            item: Box::new(ConnectionType::primitive(Primitive::Secret)),
        };
        assert!(secret_list.is_secret());

        let credential_contract = ConnectionType::Contract {
            name: "api_key".into(),
            credential: true,
        };
        assert!(credential_contract.is_secret());

        assert!(!ConnectionType::Any.is_secret());
    }

    #[test]
    fn object_schema_lookup_and_required() {
        let schema = ObjectSchema::new()
            .with(PortDecl::action(
                "target",
                "Target",
                ConnectionType::primitive(Primitive::Text),
            ))
            .with(
                PortDecl::config("depth", "Depth", ConnectionType::primitive(Primitive::Number))
                    .with_default(serde_json::json!(2)),
            );

        assert!(schema.port("target").is_some());
        assert!(schema.port("missing").is_none());

        let required: Vec<&str> = schema.required_ports().map(|p| p.id.as_str()).collect();
        assert_eq!(required, vec!["target"]);
    }

    #[test]
    fn json_schema_omits_credential_ports() {
        let schema = ObjectSchema::new()
            .with(PortDecl::action(
                "ip_address",
                "IP Address",
                ConnectionType::primitive(Primitive::Text),
            ))
            .with(PortDecl::credential("api_key", "API Key"));

        let rendered = schema.json_schema();
        let props = rendered["properties"].as_object().unwrap();
        assert!(props.contains_key("ip_address"));
        assert!(!props.contains_key("api_key"));
        assert_eq!(rendered["required"], serde_json::json!(["ip_address"]));
    }

    #[test]
    fn port_description_lands_in_schema() {
        let schema = ObjectSchema::new().with(
            PortDecl::action(
                "domain",
                "Domain",
                ConnectionType::primitive(Primitive::Text),
            )
            .with_description("apex domain to scan"),
        );
        let rendered = schema.json_schema();
        assert_eq!(
            rendered["properties"]["domain"]["description"],
            serde_json::json!("apex domain to scan")
        );
    }

    #[test]
    fn serde_roundtrip() {
        let schema = ObjectSchema::new()
            .with(PortDecl::action(
                "targets",
                "Targets",
                ConnectionType::List {
                    item: Box::new(ConnectionType::primitive(Primitive::Text)),
                },
            ))
            .with(PortDecl::credential("token", "Token"));

        let json = serde_json::to_string(&schema).unwrap();
        let back: ObjectSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }
}
