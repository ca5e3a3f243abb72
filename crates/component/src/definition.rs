//! Static component definitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handler::ComponentHandler;
use crate::retry::RetryPolicy;
use crate::schema::ObjectSchema;

/// UI/compiler grouping for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Entry points; exactly one per graph, no incoming edges.
    Trigger,
    /// Reconnaissance and scanning tools.
    Scanner,
    /// Data shaping between steps.
    Transform,
    /// Outbound integrations.
    Integration,
    /// Human-in-the-loop gates.
    Interaction,
    /// Everything else.
    Utility,
}

/// How a component's execute step is hosted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunnerSpec {
    /// Run the handler in the worker task.
    Inline,
    /// Run inside a container with a tenant+run-scoped volume.
    Container {
        /// Image reference.
        image: String,
        /// Entrypoint override, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entrypoint: Option<Vec<String>>,
        /// Command arguments.
        #[serde(default)]
        command: Vec<String>,
        /// Environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Docker network mode.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        network: Option<String>,
        /// Wall-clock budget for the container.
        timeout_seconds: u64,
        /// Wrap the command in a login shell so PTY-expecting tools behave.
        #[serde(default)]
        shell_wrapper: bool,
    },
    /// POST params to an external HTTP endpoint.
    Remote {
        /// Endpoint URL.
        endpoint: String,
        /// Secret id resolved through the secrets capability for auth.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_secret_id: Option<String>,
    },
}

/// Declares how a component is announced as an agent tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolDecl {
    /// Name announced to agents.
    pub tool_name: String,
    /// Description announced to agents.
    pub description: String,
    /// Parameter port ids agents may override; everything else stays
    /// compile-time bound.
    #[serde(default)]
    pub expose_params: Vec<String>,
}

/// An immutable component definition.
///
/// Holds the schemas and runner spec the compiler and gateway consult,
/// plus the execute handler for inline runs. Registered once at startup
/// and shared for the process lifetime.
#[derive(Clone)]
pub struct ComponentDefinition {
    /// Unique component id, e.g. `"scanner.subfinder"`.
    pub id: String,
    /// Human-readable display label.
    pub label: String,
    /// Grouping category; `Trigger` is load-bearing for the compiler.
    pub category: Category,
    /// How the execute step is hosted.
    pub runner: RunnerSpec,
    /// Action- and credential-bound input ports.
    pub input_schema: ObjectSchema,
    /// Config-bound parameter ports.
    pub parameter_schema: ObjectSchema,
    /// Output ports produced on completion.
    pub output_schema: ObjectSchema,
    /// Retry behaviour for failed attempts.
    pub retry_policy: RetryPolicy,
    /// Agent tool announcement, when this component is agent-callable.
    pub agent_tool: Option<AgentToolDecl>,
    /// Execute handler used by the inline runner.
    pub handler: Arc<dyn ComponentHandler>,
}

impl std::fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("category", &self.category)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl ComponentDefinition {
    /// Create a definition with the minimum required fields.
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        category: Category,
        handler: Arc<dyn ComponentHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            category,
            runner: RunnerSpec::Inline,
            input_schema: ObjectSchema::new(),
            parameter_schema: ObjectSchema::new(),
            output_schema: ObjectSchema::new(),
            retry_policy: RetryPolicy::default(),
            agent_tool: None,
            handler,
        }
    }

    /// Set the runner spec.
    #[must_use]
    pub fn with_runner(mut self, runner: RunnerSpec) -> Self {
        self.runner = runner;
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_inputs(mut self, schema: ObjectSchema) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, schema: ObjectSchema) -> Self {
        self.parameter_schema = schema;
        self
    }

    /// Set the output schema.
    #[must_use]
    pub fn with_outputs(mut self, schema: ObjectSchema) -> Self {
        self.output_schema = schema;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Announce this component as an agent tool.
    #[must_use]
    pub fn with_agent_tool(mut self, decl: AgentToolDecl) -> Self {
        self.agent_tool = Some(decl);
        self
    }

    /// Whether this component is a graph entry point.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.category == Category::Trigger
    }

    /// Look up the binding type of an input or parameter port.
    ///
    /// Used by the gateway to partition agent arguments: input ports are
    /// checked first, then parameters.
    #[must_use]
    pub fn binding_of(&self, port_id: &str) -> Option<crate::schema::BindingType> {
        self.input_schema
            .port(port_id)
            .or_else(|| self.parameter_schema.port(port_id))
            .map(|p| p.binding)
    }
}
