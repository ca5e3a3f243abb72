//! HTTP surface behaviour, router-level.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use cascade_api::config::{ApiConfig, AuthProviderKind, TemporalConfig};
use cascade_api::{AppState, router};
use cascade_approval::ApprovalStore;
use http_body_util::BodyExt as _;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn test_config() -> ApiConfig {
    ApiConfig {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        internal_token: "internal-secret".into(),
        master_key: "ab".repeat(32),
        temporal: TemporalConfig {
            address: "localhost:7233".into(),
            task_queue: "cascade-main".into(),
            namespace: "default".into(),
        },
        redis_url: None,
        database_url: None,
        auth_provider: AuthProviderKind::Admin,
        admin_username: "admin".into(),
        admin_password: "s3cr3t".into(),
        external: Default::default(),
    }
}

async fn app() -> (Router, AppState) {
    let state = AppState::build(test_config()).await.unwrap();
    (router(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn authed(request: Request<Body>) -> Request<Body> {
    let (mut parts, body) = request.into_parts();
    parts
        .headers
        .insert(header::AUTHORIZATION, "Bearer s3cr3t".parse().unwrap());
    Request::from_parts(parts, body)
}

fn post_json(uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn two_step_graph() -> Value {
    json!({
        "name": "recon",
        "description": "",
        "nodes": [
            {"id": "trigger", "componentId": "manual.trigger"},
            {"id": "check", "componentId": "net.ip_check",
             "data": {"label": "check", "config": {"ipAddress": "1.2.3.4"}}}
        ],
        "edges": [
            {"id": "e1", "source": "trigger", "target": "check",
             "targetHandle": "ipAddress"}
        ]
    })
}

#[tokio::test]
async fn healthz_is_public() {
    let (app, _) = app().await;
    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn guarded_paths_require_credentials() {
    let (app, _) = app().await;
    let response = app.oneshot(get("/workflows")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn internal_paths_reject_api_keys() {
    let (app, _) = app().await;
    let response = app
        .oneshot(authed(post_json(
            "/internal/mcp/tools-ready",
            &json!({"runId": "run_00000000000000000000000000000000", "requiredNodeIds": []}),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_commit_and_run_round_trip() {
    let (app, state) = app().await;

    // Create.
    let response = app
        .clone()
        .oneshot(authed(post_json("/workflows", &two_step_graph())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_owned();
    assert_eq!(created["version"], json!(1));

    // Commit returns the deterministic plan.
    let response = app
        .clone()
        .oneshot(authed(post_json(&format!("/workflows/{id}/commit"), &json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let plan = body_json(response).await;
    assert_eq!(plan["entrypoint"]["ref"], json!("trigger"));
    assert_eq!(plan["actions"].as_array().unwrap().len(), 2);

    // Run.
    let response = app
        .clone()
        .oneshot(authed(post_json(
            &format!("/workflows/{id}/run"),
            &json!({"inputs": {}}),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let run = body_json(response).await;
    let run_id = run["runId"].as_str().unwrap().to_owned();
    assert_eq!(run["taskQueue"], json!("cascade-main"));

    // Status reaches COMPLETED with full progress.
    let mut status = json!(null);
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(authed(get(&format!("/workflows/runs/{run_id}/status"))))
            .await
            .unwrap();
        status = body_json(response).await;
        if status["status"] == json!("COMPLETED") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status["status"], json!("COMPLETED"));
    assert_eq!(status["progress"]["totalActions"], json!(2));

    // Result carries the classifier output.
    let response = app
        .clone()
        .oneshot(authed(get(&format!("/workflows/runs/{run_id}/result"))))
        .await
        .unwrap();
    let result = body_json(response).await;
    assert_eq!(result["result"]["check"]["version"], json!(4));

    // Trace honours the cursor.
    let response = app
        .clone()
        .oneshot(authed(get(&format!(
            "/workflows/runs/{run_id}/trace?after=2"
        ))))
        .await
        .unwrap();
    let trace = body_json(response).await;
    let events = trace["events"].as_array().unwrap();
    assert!(events.iter().all(|e| e["sequence"].as_u64().unwrap() > 2));

    drop(state);
}

#[tokio::test]
async fn unknown_component_is_a_400_with_code() {
    let (app, _) = app().await;
    let graph = json!({
        "name": "broken",
        "nodes": [{"id": "n1", "componentId": "nope"}],
        "edges": []
    });

    let response = app
        .clone()
        .oneshot(authed(post_json("/workflows", &graph)))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_owned();

    let response = app
        .oneshot(authed(post_json(&format!("/workflows/{id}/commit"), &json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!("UnknownComponent"));
    assert_eq!(body["error"]["details"]["componentId"], json!("nope"));
}

#[tokio::test]
async fn public_approval_link_resolves_once() {
    let (app, state) = app().await;

    // A paused run mints an approval.
    let graph = json!({
        "name": "gated",
        "nodes": [
            {"id": "trigger", "componentId": "manual.trigger"},
            {"id": "gate", "componentId": "approval.gate",
             "data": {"label": "gate", "config": {"title": "Promote"}}}
        ],
        "edges": [{"id": "e1", "source": "trigger", "target": "gate"}]
    });
    let response = app
        .clone()
        .oneshot(authed(post_json("/workflows", &graph)))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_owned();
    app.clone()
        .oneshot(authed(post_json(&format!("/workflows/{id}/run"), &json!({}))))
        .await
        .unwrap();

    // Wait for the pending approval, then fish its approve token out
    // of the store (links are delivered out-of-band in production).
    let token = loop {
        let approvals = state.approvals.store().list().await.unwrap();
        if let Some(record) = approvals.first() {
            break record
                .approve_token
                .as_ref()
                .unwrap()
                .reveal()
                .to_owned();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    // First click approves.
    let response = app
        .clone()
        .oneshot(get(&format!("/approve/{token}?note=ok")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["approval"]["status"], json!("approved"));
    assert_eq!(body["approval"]["responseNote"], json!("ok"));

    // Second click is indistinguishable from an unknown token.
    let response = app
        .clone()
        .oneshot(get(&format!("/approve/{token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(get("/approve/this-token-never-existed"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn internal_token_mints_mcp_session_tokens() {
    let (app, _state) = app().await;

    // Create and start a gated run so the run id exists.
    let graph = json!({
        "name": "gated",
        "nodes": [
            {"id": "trigger", "componentId": "manual.trigger"},
            {"id": "gate", "componentId": "approval.gate",
             "data": {"label": "gate", "config": {"title": "Hold"}}}
        ],
        "edges": [{"id": "e1", "source": "trigger", "target": "gate"}]
    });
    let response = app
        .clone()
        .oneshot(authed(post_json("/workflows", &graph)))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_owned();
    let response = app
        .clone()
        .oneshot(authed(post_json(&format!("/workflows/{id}/run"), &json!({}))))
        .await
        .unwrap();
    let run_id = body_json(response).await["runId"]
        .as_str()
        .unwrap()
        .to_owned();

    let request = Request::builder()
        .method("POST")
        .uri("/internal/mcp/generate-token")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-internal-token", "internal-secret")
        .body(Body::from(
            json!({"runId": run_id, "allowedNodeIds": ["n1"]}).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["token"].as_str().unwrap().starts_with("mcp_"));
}
