//! The per-agent virtual MCP server.
//!
//! The gateway caches one virtual server per `(run, allowed-node-set)`
//! scope; sessions attach to the cached server, so repeated refreshes
//! and reconnects observe a stable tool surface. Component tools
//! dispatch into the running workflow over the tool-call bridge;
//! remote and local sources are proxied over rmcp's client.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cascade_component::{BindingType, ComponentRegistry};
use cascade_core::{CallId, NodeRef, RunId};
use cascade_executor::{ToolCallBridge, ToolCallRequest};
use chrono::Utc;
use dashmap::DashMap;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::ServerHandler;
use rmcp::service::{RequestContext, RoleServer};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::GatewayError;
use crate::registry::{RegisteredTool, ToolRegistry, ToolType};
use crate::session::SessionScope;

/// How often a dispatched call's result is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long an agent call waits before reporting a timeout.
const POLL_TIMEOUT: Duration = Duration::from_secs(60);
/// Separator between a source name and an upstream tool name.
const SOURCE_SEPARATOR: &str = "__";

/// The MCP gateway: validates sessions and hands out cached per-scope
/// virtual servers.
pub struct McpGateway {
    tools: Arc<ToolRegistry>,
    components: Arc<ComponentRegistry>,
    bridge: Arc<dyn ToolCallBridge>,
    servers: DashMap<String, RunGatewayServer>,
    call_clock: Arc<AtomicU64>,
}

impl McpGateway {
    /// Create a gateway.
    #[must_use]
    pub fn new(
        tools: Arc<ToolRegistry>,
        components: Arc<ComponentRegistry>,
        bridge: Arc<dyn ToolCallBridge>,
    ) -> Self {
        Self {
            tools,
            components,
            bridge,
            servers: DashMap::new(),
            call_clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cache key for a scope: the run id alone, or the run id plus the
    /// sorted allowed-node list. Node ids are escape-encoded so an id
    /// containing a comma cannot collide with a two-id list.
    #[must_use]
    pub fn cache_key(run_id: &RunId, allowed_node_ids: Option<&[String]>) -> String {
        match allowed_node_ids {
            None => run_id.to_string(),
            Some(ids) => {
                let mut escaped: Vec<String> =
                    ids.iter().map(|id| id.replace(',', "%2C")).collect();
                escaped.sort();
                format!("{run_id}:{}", escaped.join(","))
            }
        }
    }

    /// Validate a session's run access: the run must exist and, when
    /// the token carries an organization, it must match the run's.
    pub async fn authorize(&self, scope: &SessionScope) -> Result<(), GatewayError> {
        let run_org = self
            .bridge
            .run_access(&scope.run_id)
            .await
            .ok_or_else(|| GatewayError::RunNotFound {
                run_id: scope.run_id.clone(),
            })?;
        if let Some(session_org) = scope.organization_id {
            if run_org != Some(session_org) {
                return Err(GatewayError::Forbidden {
                    run_id: scope.run_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// The cached virtual server for a scope, created on first use.
    /// `allowed_tools` (the `x-allowed-tools` session filter) narrows
    /// the announced names and extends the cache key so differently
    /// filtered sessions never share a server.
    #[must_use]
    pub fn server_for(
        &self,
        scope: &SessionScope,
        allowed_tools: Option<Vec<String>>,
    ) -> RunGatewayServer {
        let mut key = Self::cache_key(&scope.run_id, scope.allowed_node_ids.as_deref());
        if let Some(tools) = &allowed_tools {
            let mut escaped: Vec<String> =
                tools.iter().map(|t| t.replace(',', "%2C")).collect();
            escaped.sort();
            key.push('|');
            key.push_str(&escaped.join(","));
        }
        self.servers
            .entry(key)
            .or_insert_with(|| {
                RunGatewayServer::new(
                    scope.run_id.clone(),
                    scope.allowed_node_ids.clone(),
                    allowed_tools,
                    self.tools.clone(),
                    self.components.clone(),
                    self.bridge.clone(),
                    self.call_clock.clone(),
                )
            })
            .clone()
    }

    /// Invalidate cached upstream listings for every server of a run so
    /// newly registered tools are announced. Idempotent.
    pub async fn refresh_servers_for_run(&self, run_id: &RunId) {
        // Snapshot first; shard locks must not be held across awaits.
        let servers: Vec<RunGatewayServer> = self
            .servers
            .iter()
            .filter(|entry| &entry.inner.run_id == run_id)
            .map(|entry| entry.value().clone())
            .collect();
        for server in servers {
            server.invalidate_upstream_cache().await;
        }
    }

    /// Drop cached servers of a finished run. The tool registry itself
    /// is cleaned up separately — the workflow may outlive sessions.
    pub fn release_run(&self, run_id: &RunId) {
        self.servers
            .retain(|_, server| &server.inner.run_id != run_id);
    }
}

struct ServerState {
    run_id: RunId,
    allowed_node_ids: Option<Vec<String>>,
    allowed_tools: Option<Vec<String>>,
    tools: Arc<ToolRegistry>,
    components: Arc<ComponentRegistry>,
    bridge: Arc<dyn ToolCallBridge>,
    call_clock: Arc<AtomicU64>,
    /// Agent-visible names, kept stable for the life of the session.
    announced: RwLock<HashSet<String>>,
    /// Upstream listings per source node, refreshed on invalidation.
    upstream: RwLock<HashMap<String, Vec<Tool>>>,
}

/// One scope's virtual MCP server. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RunGatewayServer {
    inner: Arc<ServerState>,
}

impl RunGatewayServer {
    fn new(
        run_id: RunId,
        allowed_node_ids: Option<Vec<String>>,
        allowed_tools: Option<Vec<String>>,
        tools: Arc<ToolRegistry>,
        components: Arc<ComponentRegistry>,
        bridge: Arc<dyn ToolCallBridge>,
        call_clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            inner: Arc::new(ServerState {
                run_id,
                allowed_node_ids,
                allowed_tools,
                tools,
                components,
                bridge,
                call_clock,
                announced: RwLock::new(HashSet::new()),
                upstream: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The run this server scopes to.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.inner.run_id
    }

    async fn invalidate_upstream_cache(&self) {
        self.inner.upstream.write().await.clear();
    }

    /// Strictly increasing millisecond stamps for call ids.
    fn next_call_millis(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.inner
            .call_clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .map_or(now, |prev| now.max(prev + 1))
    }

    async fn registered_tools(&self) -> Result<Vec<RegisteredTool>, GatewayError> {
        self.inner
            .tools
            .get_tools_for_run(&self.inner.run_id, self.inner.allowed_node_ids.as_deref())
            .await
    }

    /// Whether two handles serve the same cached scope.
    #[must_use]
    pub fn shares_state_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Build the agent-visible tool list: component tools as-is,
    /// upstream tools as `{source}__{tool}`.
    pub async fn visible_tools(&self) -> Result<Vec<Tool>, GatewayError> {
        let mut visible = Vec::new();
        for tool in self.registered_tools().await? {
            match tool.r#type {
                ToolType::Component => {
                    visible.push(make_tool(
                        tool.tool_name.clone(),
                        tool.description.clone(),
                        tool.input_schema.clone(),
                    ));
                }
                ToolType::Remote | ToolType::Local => {
                    let Some(endpoint) = tool.endpoint.clone() else {
                        continue;
                    };
                    match self.upstream_tools(&tool, &endpoint).await {
                        Ok(upstream) => visible.extend(upstream),
                        Err(e) => {
                            // A dead source hides its tools; everything
                            // else still lists.
                            tracing::warn!(
                                run_id = %self.inner.run_id,
                                node_id = %tool.node_id,
                                error = %e,
                                "upstream source unavailable"
                            );
                        }
                    }
                }
            }
        }

        if let Some(allowed) = &self.inner.allowed_tools {
            visible.retain(|tool| allowed.iter().any(|name| name.as_str() == tool.name.as_ref()));
        }

        let mut announced = self.inner.announced.write().await;
        for tool in &visible {
            announced.insert(tool.name.to_string());
        }
        Ok(visible)
    }

    fn tool_allowed(&self, name: &str) -> bool {
        self.inner
            .allowed_tools
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|n| n == name))
    }

    async fn upstream_tools(
        &self,
        source: &RegisteredTool,
        endpoint: &str,
    ) -> Result<Vec<Tool>, GatewayError> {
        if let Some(cached) = self.inner.upstream.read().await.get(&source.node_id) {
            return Ok(cached.clone());
        }

        let listed = crate::proxy::list_tools(endpoint).await?;
        self.inner
            .tools
            .mark_ready(&self.inner.run_id, &source.node_id)
            .await?;

        let prefixed: Vec<Tool> = listed
            .into_iter()
            .map(|tool| {
                let name = format!("{}{SOURCE_SEPARATOR}{}", source.tool_name, tool.name);
                Tool {
                    name: name.into(),
                    ..tool
                }
            })
            .collect();
        self.inner
            .upstream
            .write()
            .await
            .insert(source.node_id.clone(), prefixed.clone());
        Ok(prefixed)
    }

    /// Dispatch a component tool through the workflow.
    pub async fn call_component(
        &self,
        tool: &RegisteredTool,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, GatewayError> {
        let component_id = tool
            .component_id
            .clone()
            .ok_or_else(|| GatewayError::ToolNotFound {
                run_id: self.inner.run_id.clone(),
                node_id: tool.node_id.clone(),
            })?;
        let def =
            self.inner
                .components
                .get(&component_id)
                .ok_or_else(|| GatewayError::ToolNotFound {
                    run_id: self.inner.run_id.clone(),
                    node_id: tool.node_id.clone(),
                })?;

        // Partition agent arguments by binding type. Credential-bound
        // keys are dropped — credentials only ever come from the
        // registry.
        let mut action_args = serde_json::Map::new();
        let mut param_overrides = serde_json::Map::new();
        for (key, value) in arguments.unwrap_or_default() {
            match def.binding_of(&key) {
                Some(BindingType::Credential) => {
                    tracing::warn!(
                        run_id = %self.inner.run_id,
                        node_id = %tool.node_id,
                        key,
                        "agent-supplied credential argument dropped"
                    );
                }
                Some(BindingType::Config) => {
                    param_overrides.insert(key, value);
                }
                Some(BindingType::Action) | None => {
                    action_args.insert(key, value);
                }
            }
        }

        let mut parameters = tool
            .parameters
            .as_object()
            .cloned()
            .unwrap_or_default();
        for (key, value) in param_overrides {
            parameters.insert(key, value);
        }

        let credentials = self
            .inner
            .tools
            .get_tool_credentials(&self.inner.run_id, &tool.node_id)
            .await?;

        let node_ref = NodeRef::new(tool.node_id.clone())
            .map_err(|e| GatewayError::Kv(format!("bad node id in registry: {e}")))?;
        let call_id = CallId::new(&self.inner.run_id, &node_ref, self.next_call_millis());

        self.inner
            .bridge
            .execute_tool_call(
                &self.inner.run_id,
                ToolCallRequest {
                    call_id: call_id.clone(),
                    node_id: node_ref.clone(),
                    component_id,
                    arguments: Value::Object(action_args),
                    parameters: Value::Object(parameters),
                    credentials,
                    requested_at: Utc::now(),
                },
            )
            .await?;

        let result = self.poll_result(&call_id).await;

        let (output, error_message, status) = match &result {
            Some(envelope) if envelope.success => (
                envelope.output.clone(),
                None,
                "completed".to_owned(),
            ),
            Some(envelope) => (
                None,
                envelope.error.clone(),
                "failed".to_owned(),
            ),
            None => (
                None,
                Some(format!(
                    "tool call timed out after {}s",
                    POLL_TIMEOUT.as_secs()
                )),
                "failed".to_owned(),
            ),
        };
        if let Err(e) = self
            .inner
            .bridge
            .notify_tool_call_completed(
                &self.inner.run_id,
                node_ref,
                tool.tool_name.clone(),
                output.clone(),
                error_message.clone(),
                status,
            )
            .await
        {
            tracing::debug!(error = %e, "tool completion notification dropped");
        }

        Ok(match (output, error_message) {
            (Some(output), _) => {
                let text = serde_json::to_string(&output).unwrap_or_else(|_| output.to_string());
                CallToolResult {
                    content: vec![Content::text(text)],
                    structured_content: Some(output),
                    is_error: None,
                    meta: None,
                }
            }
            (None, Some(message)) => error_result(&message),
            (None, None) => error_result("tool produced no output"),
        })
    }

    async fn poll_result(&self, call_id: &CallId) -> Option<cascade_executor::ToolCallResult> {
        let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
        loop {
            if let Some(result) = self
                .inner
                .bridge
                .get_tool_call_result(&self.inner.run_id, call_id)
                .await
            {
                return Some(result);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Route an upstream call through its source.
    async fn call_upstream(
        &self,
        source: &RegisteredTool,
        upstream_name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, GatewayError> {
        let endpoint = source
            .endpoint
            .clone()
            .ok_or_else(|| GatewayError::ToolNotFound {
                run_id: self.inner.run_id.clone(),
                node_id: source.node_id.clone(),
            })?;
        crate::proxy::call_tool(&endpoint, upstream_name, arguments).await
    }
}

fn make_tool(name: String, description: String, input_schema: Value) -> Tool {
    let schema_map = match input_schema {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    Tool {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema: Arc::new(schema_map),
        output_schema: None,
        icons: None,
        annotations: None,
        execution: None,
        meta: None,
    }
}

fn error_result(message: &str) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(format!("Error: {message}"))],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

impl ServerHandler for RunGatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "cascade-gateway".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Tools registered for this workflow run. Component tools execute inside \
                 the running workflow; prefixed tools are proxied to external sources."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self
            .visible_tools()
            .await
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        if !self.tool_allowed(&request.name) {
            return Err(ErrorData::method_not_found::<
                rmcp::model::CallToolRequestMethod,
            >());
        }

        let registered = self
            .registered_tools()
            .await
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;

        // Component tools match by announced name.
        if let Some(tool) = registered
            .iter()
            .find(|t| t.r#type == ToolType::Component && t.tool_name == request.name)
        {
            return match self.call_component(tool, request.arguments).await {
                Ok(result) => Ok(result),
                Err(e) => Ok(error_result(&e.to_string())),
            };
        }

        // `{source}__{tool}` routes to an upstream source.
        if let Some((source_name, upstream_name)) = request.name.split_once(SOURCE_SEPARATOR) {
            if let Some(source) = registered.iter().find(|t| {
                matches!(t.r#type, ToolType::Remote | ToolType::Local)
                    && t.tool_name == source_name
            }) {
                return match self
                    .call_upstream(source, upstream_name, request.arguments)
                    .await
                {
                    Ok(result) => Ok(result),
                    Err(e) => Ok(error_result(&e.to_string())),
                };
            }
        }

        Err(ErrorData::method_not_found::<
            rmcp::model::CallToolRequestMethod,
        >())
    }
}
