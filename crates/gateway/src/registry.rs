//! The per-run tool registry.
//!
//! Keyed `(run, node)` in a shared KV hash (`mcp:run:{run}:tools`,
//! field = node id) so every gateway instance observing the same run
//! agrees on the tool set. Credentials are sealed before storage and
//! opened lazily on dispatch.

use std::sync::Arc;

use cascade_core::RunId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::CredentialSealer;
use crate::error::GatewayError;
use crate::kv::KvStore;

/// What backs a registered tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// A registered component, dispatched through the workflow.
    Component,
    /// An external MCP server reached over HTTP.
    Remote,
    /// A worker-local MCP server in a managed container.
    Local,
}

/// Registration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Registered but not yet proven reachable.
    Pending,
    /// Serving tools.
    Ready,
    /// Marked unusable.
    Failed,
}

/// One registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredTool {
    /// The owning run.
    pub run_id: RunId,
    /// The graph node this tool maps to.
    pub node_id: String,
    /// Agent-visible name (source name for remote/local).
    pub tool_name: String,
    /// What backs this tool.
    pub r#type: ToolType,
    /// The component id, for component tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    /// The MCP endpoint, for remote and local tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// The managed container, for local tools; returned by cleanup so
    /// the caller can stop it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Tool description announced to agents.
    pub description: String,
    /// JSON Schema announced to agents.
    pub input_schema: Value,
    /// Compile-time bound parameters.
    pub parameters: Value,
    /// Sealed credential blob; opened only on dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    /// Registration lifecycle.
    pub status: ToolStatus,
}

/// KV-backed registry of agent-callable tools, shared across gateway
/// instances. Last-writer-wins per `(run, node)` is acceptable: the
/// pair uniquely identifies a tool.
pub struct ToolRegistry {
    kv: Arc<dyn KvStore>,
    sealer: Arc<CredentialSealer>,
}

/// Input for registering a component-backed tool.
#[derive(Debug, Clone)]
pub struct RegisterComponent {
    /// The owning run.
    pub run_id: RunId,
    /// The graph node.
    pub node_id: String,
    /// Agent-visible tool name.
    pub tool_name: String,
    /// The component to dispatch.
    pub component_id: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for agent arguments.
    pub input_schema: Value,
    /// Compile-time bound parameters.
    pub parameters: Value,
    /// Plaintext credentials; sealed before storage.
    pub credentials: Option<Value>,
}

impl ToolRegistry {
    /// Create a registry over the shared KV and sealer.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, sealer: Arc<CredentialSealer>) -> Self {
        Self { kv, sealer }
    }

    fn run_key(run_id: &RunId) -> String {
        format!("mcp:run:{run_id}:tools")
    }

    async fn put(&self, tool: &RegisteredTool) -> Result<(), GatewayError> {
        let serialized =
            serde_json::to_string(tool).map_err(|e| GatewayError::Kv(e.to_string()))?;
        self.kv
            .hset(&Self::run_key(&tool.run_id), &tool.node_id, serialized)
            .await
    }

    /// Register a component tool; ready immediately.
    pub async fn register_component(
        &self,
        input: RegisterComponent,
    ) -> Result<RegisteredTool, GatewayError> {
        let credentials = input
            .credentials
            .as_ref()
            .map(|c| self.sealer.seal(c))
            .transpose()?;
        let tool = RegisteredTool {
            run_id: input.run_id,
            node_id: input.node_id,
            tool_name: input.tool_name,
            r#type: ToolType::Component,
            component_id: Some(input.component_id),
            endpoint: None,
            container_id: None,
            description: input.description,
            input_schema: input.input_schema,
            parameters: input.parameters,
            credentials,
            status: ToolStatus::Ready,
        };
        self.put(&tool).await?;
        tracing::info!(
            run_id = %tool.run_id,
            node_id = %tool.node_id,
            tool_name = %tool.tool_name,
            "component tool registered"
        );
        Ok(tool)
    }

    /// Register an external MCP source; pending until its first
    /// successful tool listing.
    pub async fn register_remote(
        &self,
        run_id: RunId,
        node_id: String,
        tool_name: String,
        endpoint: String,
        description: String,
    ) -> Result<RegisteredTool, GatewayError> {
        let tool = RegisteredTool {
            run_id,
            node_id,
            tool_name,
            r#type: ToolType::Remote,
            component_id: None,
            endpoint: Some(endpoint),
            container_id: None,
            description,
            input_schema: serde_json::json!({}),
            parameters: serde_json::json!({}),
            credentials: None,
            status: ToolStatus::Pending,
        };
        self.put(&tool).await?;
        Ok(tool)
    }

    /// Register a worker-local MCP source, recording its container for
    /// cleanup.
    pub async fn register_local(
        &self,
        run_id: RunId,
        node_id: String,
        tool_name: String,
        container_id: String,
        endpoint: String,
        description: String,
    ) -> Result<RegisteredTool, GatewayError> {
        let tool = RegisteredTool {
            run_id,
            node_id,
            tool_name,
            r#type: ToolType::Local,
            component_id: None,
            endpoint: Some(endpoint),
            container_id: Some(container_id),
            description,
            input_schema: serde_json::json!({}),
            parameters: serde_json::json!({}),
            credentials: None,
            status: ToolStatus::Pending,
        };
        self.put(&tool).await?;
        Ok(tool)
    }

    /// All tools of a run, optionally filtered to an allowed node set,
    /// sorted by node id.
    pub async fn get_tools_for_run(
        &self,
        run_id: &RunId,
        allowed_node_ids: Option<&[String]>,
    ) -> Result<Vec<RegisteredTool>, GatewayError> {
        let raw = self.kv.hgetall(&Self::run_key(run_id)).await?;
        let mut tools = Vec::with_capacity(raw.len());
        for (node_id, serialized) in raw {
            if let Some(allowed) = allowed_node_ids {
                if !allowed.contains(&node_id) {
                    continue;
                }
            }
            match serde_json::from_str::<RegisteredTool>(&serialized) {
                Ok(tool) => tools.push(tool),
                Err(e) => {
                    tracing::warn!(run_id = %run_id, node_id, error = %e, "corrupt tool record skipped");
                }
            }
        }
        tools.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(tools)
    }

    /// Fetch one tool.
    pub async fn get_tool(
        &self,
        run_id: &RunId,
        node_id: &str,
    ) -> Result<RegisteredTool, GatewayError> {
        let serialized = self
            .kv
            .hget(&Self::run_key(run_id), node_id)
            .await?
            .ok_or_else(|| GatewayError::ToolNotFound {
                run_id: run_id.clone(),
                node_id: node_id.to_owned(),
            })?;
        serde_json::from_str(&serialized).map_err(|e| GatewayError::Kv(e.to_string()))
    }

    /// Decrypt a tool's credentials on demand. `Ok(None)` when the tool
    /// carries none; decryption failures are fatal.
    pub async fn get_tool_credentials(
        &self,
        run_id: &RunId,
        node_id: &str,
    ) -> Result<Option<Value>, GatewayError> {
        let tool = self.get_tool(run_id, node_id).await?;
        match tool.credentials {
            None => Ok(None),
            Some(sealed) => {
                self.sealer
                    .open(&sealed)
                    .map(Some)
                    .map_err(|_| GatewayError::DecryptionFailed {
                        run_id: run_id.clone(),
                        node_id: node_id.to_owned(),
                    })
            }
        }
    }

    /// Transition a pending source to ready after its first successful
    /// tool listing.
    pub async fn mark_ready(&self, run_id: &RunId, node_id: &str) -> Result<(), GatewayError> {
        let mut tool = self.get_tool(run_id, node_id).await?;
        if tool.status != ToolStatus::Ready {
            tool.status = ToolStatus::Ready;
            self.put(&tool).await?;
        }
        Ok(())
    }

    /// Whether every required node has a ready tool.
    pub async fn are_all_tools_ready(
        &self,
        run_id: &RunId,
        required_node_ids: &[String],
    ) -> Result<bool, GatewayError> {
        let tools = self.get_tools_for_run(run_id, None).await?;
        Ok(required_node_ids.iter().all(|node_id| {
            tools
                .iter()
                .any(|t| &t.node_id == node_id && t.status == ToolStatus::Ready)
        }))
    }

    /// Remove every record of a run. Returns the container ids the
    /// caller must stop.
    pub async fn cleanup_run(&self, run_id: &RunId) -> Result<Vec<String>, GatewayError> {
        let tools = self.get_tools_for_run(run_id, None).await?;
        let containers: Vec<String> = tools
            .iter()
            .filter_map(|t| t.container_id.clone())
            .collect();
        self.kv.delete(&Self::run_key(run_id)).await?;
        tracing::info!(run_id = %run_id, tools = tools.len(), "tool registry cleaned up");
        Ok(containers)
    }
}
