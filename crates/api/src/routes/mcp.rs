//! MCP session plumbing.
//!
//! `GET /mcp/sse` opens a session under a bearer session token: the
//! first SSE event names the message endpoint
//! (`/mcp/messages?sessionId=…`), every later event carries one
//! server-to-client JSON-RPC message. `POST /mcp/messages` feeds
//! client messages into the session. Protocol semantics live entirely
//! in rmcp — this module only moves its messages over HTTP.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Json, http::StatusCode};
use futures::Stream;
use rmcp::ServiceExt;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::service::RoleServer;
use rmcp::transport::Transport;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::state::AppState;

const KEEPALIVE: Duration = Duration::from_secs(15);
const EXPECTED_PROTOCOL_VERSION: &str = "2025-06-18";

/// Channel-backed transport binding one HTTP session to a gateway
/// server instance.
struct SessionTransport {
    to_client: mpsc::Sender<ServerJsonRpcMessage>,
    from_client: mpsc::Receiver<ClientJsonRpcMessage>,
}

impl Transport<RoleServer> for SessionTransport {
    type Error = std::io::Error;

    fn send(
        &mut self,
        item: ServerJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let tx = self.to_client.clone();
        async move {
            tx.send(item).await.map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client disconnected")
            })
        }
    }

    fn receive(&mut self) -> impl Future<Output = Option<ClientJsonRpcMessage>> + Send {
        self.from_client.recv()
    }

    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.from_client.close();
        std::future::ready(Ok(()))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
        .ok_or_else(ApiError::unauthenticated)
}

fn allowed_tools(headers: &HeaderMap) -> Option<Vec<String>> {
    let raw = headers.get("x-allowed-tools")?.to_str().ok()?;
    let tools: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();
    (!tools.is_empty()).then_some(tools)
}

/// `GET /mcp/sse`
pub async fn open_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let token = bearer_token(&headers)?;
    let scope = state.sessions.validate(&token).await?;
    state.gateway.authorize(&scope).await?;

    if let Some(version) = headers
        .get("mcp-protocol-version")
        .and_then(|v| v.to_str().ok())
    {
        if version != EXPECTED_PROTOCOL_VERSION {
            tracing::debug!(version, "client negotiates a different protocol version");
        }
    }

    let server = state
        .gateway
        .server_for(&scope, allowed_tools(&headers));
    let session_id = format!("{:032x}", rand::random::<u128>());

    let (inbound_tx, inbound_rx) = mpsc::channel::<ClientJsonRpcMessage>(64);
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerJsonRpcMessage>(64);
    state
        .mcp_sessions
        .insert(session_id.clone(), inbound_tx);

    let transport = SessionTransport {
        to_client: outbound_tx,
        from_client: inbound_rx,
    };
    let sessions = state.mcp_sessions.clone();
    let run_id = scope.run_id.clone();
    {
        let session_id = session_id.clone();
        tokio::spawn(async move {
            match server.serve(transport).await {
                Ok(running) => {
                    let _ = running.waiting().await;
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "mcp session setup failed");
                }
            }
            // The transport is torn down with the session; the tool
            // registry is not — the workflow may still be running.
            sessions.remove(&session_id);
            tracing::info!(run_id = %run_id, session_id, "mcp session closed");
        });
    }

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/mcp/messages?sessionId={session_id}"));
    let messages = ReceiverStream::new(outbound_rx).map(|message| {
        Event::default().event("message").data(
            serde_json::to_string(&message).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unserializable server message");
                String::new()
            }),
        )
    });
    let stream = tokio_stream::once(endpoint).chain(messages).map(Ok);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE)))
}

/// Query string of `POST /mcp/messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    session_id: String,
}

/// `POST /mcp/messages?sessionId=…`
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Json(message): Json<ClientJsonRpcMessage>,
) -> Result<StatusCode, ApiError> {
    let sender = state
        .mcp_sessions
        .get(&query.session_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| ApiError::not_found("unknown mcp session"))?;
    sender
        .send(message)
        .await
        .map_err(|_| ApiError::not_found("mcp session closed"))?;
    Ok(StatusCode::ACCEPTED)
}
