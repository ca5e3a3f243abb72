//! Worker-only endpoints, guarded by the internal shared secret.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use cascade_core::{AgentId, OrganizationId, RunId};
use cascade_gateway::RegisterComponent;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

fn parse_run_id(raw: &str) -> Result<RunId, ApiError> {
    RunId::parse(raw).map_err(|_| ApiError::validation(format!("not a run id: {raw}")))
}

/// Body of `generate-token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokenBody {
    run_id: String,
    #[serde(default)]
    organization_id: Option<OrganizationId>,
    #[serde(default)]
    agent_id: Option<AgentId>,
    #[serde(default)]
    allowed_node_ids: Option<Vec<String>>,
    #[serde(default)]
    ttl_seconds: Option<u64>,
}

/// `POST /internal/mcp/generate-token`
pub async fn generate_token(
    State(state): State<AppState>,
    Json(body): Json<GenerateTokenBody>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&body.run_id)?;
    let ttl = Duration::from_secs(body.ttl_seconds.unwrap_or(3600));
    let token = state
        .sessions
        .mint(
            run_id,
            body.organization_id,
            body.agent_id,
            body.allowed_node_ids,
            ttl,
        )
        .await?;
    Ok(Json(json!({ "token": token, "expiresInSeconds": ttl.as_secs() })))
}

/// Body of `register-component`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterComponentBody {
    run_id: String,
    node_id: String,
    tool_name: String,
    component_id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    input_schema: Option<Value>,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    credentials: Option<Value>,
}

/// `POST /internal/mcp/register-component`
pub async fn register_component(
    State(state): State<AppState>,
    Json(body): Json<RegisterComponentBody>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&body.run_id)?;

    // The component's own schema is authoritative when the caller does
    // not send one.
    let input_schema = match body.input_schema {
        Some(schema) => schema,
        None => state
            .registry
            .get(&body.component_id)
            .map(|def| def.input_schema.json_schema())
            .ok_or_else(|| {
                ApiError::validation(format!("unknown component: {}", body.component_id))
            })?,
    };

    let tool = state
        .tools
        .register_component(RegisterComponent {
            run_id: run_id.clone(),
            node_id: body.node_id,
            tool_name: body.tool_name,
            component_id: body.component_id,
            description: body.description,
            input_schema,
            parameters: body.parameters,
            credentials: body.credentials,
        })
        .await?;
    state.gateway.refresh_servers_for_run(&run_id).await;
    Ok(Json(json!({ "registered": true, "nodeId": tool.node_id, "status": tool.status })))
}

/// Body of `register-remote`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRemoteBody {
    run_id: String,
    node_id: String,
    tool_name: String,
    endpoint: String,
    #[serde(default)]
    description: String,
}

/// `POST /internal/mcp/register-remote`
pub async fn register_remote(
    State(state): State<AppState>,
    Json(body): Json<RegisterRemoteBody>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&body.run_id)?;
    let tool = state
        .tools
        .register_remote(
            run_id.clone(),
            body.node_id,
            body.tool_name,
            body.endpoint,
            body.description,
        )
        .await?;
    state.gateway.refresh_servers_for_run(&run_id).await;
    Ok(Json(json!({ "registered": true, "nodeId": tool.node_id, "status": tool.status })))
}

/// Body of `register-local`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLocalBody {
    run_id: String,
    node_id: String,
    tool_name: String,
    container_id: String,
    endpoint: String,
    #[serde(default)]
    description: String,
}

/// `POST /internal/mcp/register-local`
pub async fn register_local(
    State(state): State<AppState>,
    Json(body): Json<RegisterLocalBody>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&body.run_id)?;
    let tool = state
        .tools
        .register_local(
            run_id.clone(),
            body.node_id,
            body.tool_name,
            body.container_id,
            body.endpoint,
            body.description,
        )
        .await?;
    state.gateway.refresh_servers_for_run(&run_id).await;
    Ok(Json(json!({ "registered": true, "nodeId": tool.node_id, "status": tool.status })))
}

/// Body of `cleanup`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupBody {
    run_id: String,
}

/// `POST /internal/mcp/cleanup` — returns the containers the worker
/// must stop.
pub async fn cleanup(
    State(state): State<AppState>,
    Json(body): Json<CleanupBody>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&body.run_id)?;
    let containers = state.tools.cleanup_run(&run_id).await?;
    state.gateway.release_run(&run_id);
    Ok(Json(json!({ "cleaned": true, "containerIds": containers })))
}

/// Body of `tools-ready`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsReadyBody {
    run_id: String,
    #[serde(default)]
    required_node_ids: Vec<String>,
}

/// `POST /internal/mcp/tools-ready`
pub async fn tools_ready(
    State(state): State<AppState>,
    Json(body): Json<ToolsReadyBody>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&body.run_id)?;
    let ready = state
        .tools
        .are_all_tools_ready(&run_id, &body.required_node_ids)
        .await?;
    Ok(Json(json!({ "ready": ready })))
}
