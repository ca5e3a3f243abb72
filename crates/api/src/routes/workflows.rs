//! Workflow CRUD, compilation, and run control.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use cascade_core::{RunId, WorkflowId};
use cascade_executor::{RunStatus, RunStore, WorkflowRuntime};
use cascade_trace::TraceEventType;
use cascade_workflow::{WorkflowGraph, WorkflowStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

fn parse_workflow_id(raw: &str) -> Result<WorkflowId, ApiError> {
    WorkflowId::parse(raw).map_err(|_| ApiError::validation(format!("not a workflow id: {raw}")))
}

fn parse_run_id(raw: &str) -> Result<RunId, ApiError> {
    RunId::parse(raw).map_err(|_| ApiError::validation(format!("not a run id: {raw}")))
}

/// `POST /workflows`
pub async fn create(
    State(state): State<AppState>,
    Json(graph): Json<WorkflowGraph>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let record = state.workflows.create(graph, None).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(record).unwrap_or_default())))
}

/// `GET /workflows`
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let records = state.workflows.list().await?;
    Ok(Json(json!({ "workflows": records })))
}

/// `GET /workflows/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.workflows.get(parse_workflow_id(&id)?).await?;
    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}

/// `PUT /workflows/{id}`
pub async fn replace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(graph): Json<WorkflowGraph>,
) -> Result<Json<Value>, ApiError> {
    let record = state.workflows.replace(parse_workflow_id(&id)?, graph).await?;
    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}

/// `POST /workflows/{id}/commit` — compile and persist the plan.
pub async fn commit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    let record = state.workflows.get(workflow_id).await?;
    let plan = state.compiler.compile(&record.graph)?;
    let compiled = serde_json::to_value(&plan)
        .map_err(|e| ApiError::configuration(format!("plan serialization: {e}")))?;
    state.workflows.set_compiled(workflow_id, compiled.clone()).await?;
    Ok(Json(compiled))
}

/// Body of `POST /workflows/{id}/run`.
#[derive(Debug, Default, Deserialize)]
pub struct RunBody {
    #[serde(default)]
    inputs: Option<Value>,
}

/// `POST /workflows/{id}/run`
pub async fn run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RunBody>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    let record = state.workflows.get(workflow_id).await?;
    let plan = state.compiler.compile(&record.graph)?;
    let inputs = body
        .and_then(|Json(b)| b.inputs)
        .unwrap_or_else(|| json!({}));

    let run = state
        .runtime
        .start(workflow_id, plan, inputs, record.organization_id)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "runId": run.run_id,
            "internalRunId": run.internal_run_id,
            "taskQueue": state.config.temporal.task_queue,
            "status": run.status,
        })),
    ))
}

/// `GET /workflows/runs/{run_id}/status`
pub async fn status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&run_id)?;
    let record = state.runs.get(&run_id).await?;
    let completed = state
        .trace
        .count_by_type(&run_id, TraceEventType::NodeCompleted)
        .await?;
    Ok(Json(json!({
        "runId": record.run_id,
        "internalRunId": record.internal_run_id,
        "workflowId": record.workflow_id,
        "status": record.status,
        "progress": {
            "completedActions": completed.min(u64::from(record.total_actions)),
            "totalActions": record.total_actions,
        },
        "createdAt": record.created_at,
        "updatedAt": record.updated_at,
    })))
}

/// `GET /workflows/runs/{run_id}/result`
pub async fn result(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&run_id)?;
    let record = state.runs.get(&run_id).await?;
    match record.status {
        RunStatus::Completed => Ok(Json(json!({
            "runId": record.run_id,
            "status": record.status,
            "result": record.result,
        }))),
        status if status.is_terminal() => Ok(Json(json!({
            "runId": record.run_id,
            "status": status,
            "error": record.error,
        }))),
        status => Err(ApiError::new(
            cascade_core::ErrorKind::Conflict,
            format!("run is still {status}"),
        )),
    }
}

/// `POST /workflows/runs/{run_id}/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let run_id = parse_run_id(&run_id)?;
    // Cancelling an already-finished run is a no-op, not an error.
    match state.runtime.cancel(&run_id).await {
        Ok(()) => {}
        Err(e) => {
            let record = state.runs.get(&run_id).await?;
            if !record.status.is_terminal() {
                return Err(e.into());
            }
        }
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "runId": run_id, "cancelRequested": true })),
    ))
}

/// Query string of the trace endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TraceQuery {
    #[serde(default)]
    after: Option<u64>,
}

/// `GET /workflows/runs/{run_id}/trace[?after=seq]`
pub async fn trace(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<TraceQuery>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&run_id)?;
    // 404 for a run that never existed.
    state.runs.get(&run_id).await?;

    let after = query.after.unwrap_or(0);
    let events = state.trace.list_since(&run_id, after).await?;
    let cursor = events.last().map_or(after, |e| e.sequence);
    Ok(Json(json!({ "events": events, "cursor": cursor })))
}
