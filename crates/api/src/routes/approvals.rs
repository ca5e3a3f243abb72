//! Approval endpoints, including the public tokenized links.

use axum::Json;
use axum::extract::{Path, Query, State};
use cascade_approval::{ApprovalError, ApprovalStore, Decision};
use cascade_core::ApprovalId;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

fn parse_approval_id(raw: &str) -> Result<ApprovalId, ApiError> {
    ApprovalId::parse(raw).map_err(|_| ApiError::validation(format!("not an approval id: {raw}")))
}

fn responder(identity: Option<&Identity>) -> Option<String> {
    match identity {
        Some(Identity::User { subject, .. }) => Some(subject.clone()),
        Some(Identity::ApiKey { .. }) => Some("api-key".to_owned()),
        Some(Identity::Internal) => Some("internal".to_owned()),
        None => None,
    }
}

/// `GET /approvals`
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let records = state.approvals.store().list().await?;
    Ok(Json(json!({ "approvals": records })))
}

/// `GET /approvals/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.approvals.store().get(parse_approval_id(&id)?).await?;
    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}

/// Optional body of the approve/reject endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    #[serde(default)]
    response_note: Option<String>,
    #[serde(default)]
    selection: Option<Value>,
}

async fn resolve(
    state: &AppState,
    id: &str,
    identity: Option<&Identity>,
    body: Option<DecisionBody>,
    approved: bool,
) -> Result<Json<Value>, ApiError> {
    let body = body.unwrap_or_default();
    let mut decision = if approved {
        Decision::approve()
    } else {
        Decision::reject()
    };
    decision.responded_by = responder(identity);
    decision.response_note = body.response_note;
    decision.selection = body.selection;

    let record = state
        .approvals
        .resolve(parse_approval_id(id)?, decision)
        .await?;
    Ok(Json(json!({ "success": true, "approval": record })))
}

/// `POST /approvals/{id}/approve`
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    identity: Option<axum::Extension<Identity>>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<Value>, ApiError> {
    resolve(
        &state,
        &id,
        identity.as_ref().map(|e| &e.0),
        body.map(|Json(b)| b),
        true,
    )
    .await
}

/// `POST /approvals/{id}/reject`
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    identity: Option<axum::Extension<Identity>>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<Value>, ApiError> {
    resolve(
        &state,
        &id,
        identity.as_ref().map(|e| &e.0),
        body.map(|Json(b)| b),
        false,
    )
    .await
}

/// Query string of the public link endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LinkQuery {
    #[serde(default)]
    note: Option<String>,
}

async fn resolve_by_token(
    state: &AppState,
    token: &str,
    note: Option<String>,
) -> Result<Json<Value>, ApiError> {
    match state.approvals.resolve_by_token(token, None, note).await {
        Ok(record) => Ok(Json(json!({ "success": true, "approval": record }))),
        // Unknown and already-resolved are both 404 on the public path.
        Err(ApprovalError::TokenNotFound | ApprovalError::AlreadyResolved { .. }) => {
            Err(ApiError::not_found("approval link does not resolve"))
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /approve/{token}` — public, unauthenticated.
pub async fn approve_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<LinkQuery>,
) -> Result<Json<Value>, ApiError> {
    resolve_by_token(&state, &token, query.note).await
}

/// `GET /reject/{token}` — public, unauthenticated.
pub async fn reject_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<LinkQuery>,
) -> Result<Json<Value>, ApiError> {
    resolve_by_token(&state, &token, query.note).await
}
