//! Router assembly and serving.

use axum::routing::{get, post, put};
use axum::{Json, Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{require_auth, require_internal};
use crate::routes::{approvals, internal, mcp, stream, workflows};
use crate::state::AppState;

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    // Public: liveness and the tokenized approval links. The token is
    // the credential.
    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/approve/{token}", get(approvals::approve_by_token))
        .route("/reject/{token}", get(approvals::reject_by_token));

    // MCP sessions carry their own bearer session tokens.
    let mcp = Router::new()
        .route("/mcp/sse", get(mcp::open_session))
        .route("/mcp/messages", post(mcp::post_message));

    // Worker-only surface.
    let internal = Router::new()
        .route("/internal/mcp/generate-token", post(internal::generate_token))
        .route(
            "/internal/mcp/register-component",
            post(internal::register_component),
        )
        .route(
            "/internal/mcp/register-remote",
            post(internal::register_remote),
        )
        .route(
            "/internal/mcp/register-local",
            post(internal::register_local),
        )
        .route("/internal/mcp/cleanup", post(internal::cleanup))
        .route("/internal/mcp/tools-ready", post(internal::tools_ready))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_internal,
        ));

    // Authenticated API surface.
    let api = Router::new()
        .route("/workflows", post(workflows::create).get(workflows::list))
        .route(
            "/workflows/{id}",
            put(workflows::replace).get(workflows::get),
        )
        .route("/workflows/{id}/commit", post(workflows::commit))
        .route("/workflows/{id}/run", post(workflows::run))
        .route("/workflows/runs/{run_id}/status", get(workflows::status))
        .route("/workflows/runs/{run_id}/result", get(workflows::result))
        .route("/workflows/runs/{run_id}/cancel", post(workflows::cancel))
        .route("/workflows/runs/{run_id}/trace", get(workflows::trace))
        .route("/workflows/runs/{run_id}/stream", get(stream::stream))
        .route("/approvals", get(approvals::list))
        .route("/approvals/{id}", get(approvals::get))
        .route("/approvals/{id}/approve", post(approvals::approve))
        .route("/approvals/{id}/reject", post(approvals::reject))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(mcp)
        .merge(internal)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the shutdown future resolves.
pub async fn serve(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let bind = state.config.bind;
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
