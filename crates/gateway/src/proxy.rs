//! External MCP source proxying.
//!
//! Each upstream interaction opens a fresh client with a unique client
//! identity, so upstream session state never leaks between calls, and
//! closes it on all paths.

use std::time::Duration;

use rmcp::ServiceExt;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, Implementation, Tool,
};
use rmcp::transport::StreamableHttpClientTransport;

use crate::error::GatewayError;

const LIST_ATTEMPTS: u32 = 5;
const LIST_RETRY_DELAY: Duration = Duration::from_secs(1);
const CALL_ATTEMPTS: u32 = 3;
const CALL_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

fn client_info() -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: format!("cascade-gateway-{:016x}", rand::random::<u64>()),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            ..Default::default()
        },
    }
}

/// List an upstream server's tools, retrying connection and listing up
/// to five times with a one-second delay.
pub async fn list_tools(endpoint: &str) -> Result<Vec<Tool>, GatewayError> {
    let mut last_error = String::new();
    for attempt in 1..=LIST_ATTEMPTS {
        match try_list(endpoint).await {
            Ok(tools) => return Ok(tools),
            Err(e) => {
                tracing::warn!(endpoint, attempt, error = %e, "upstream tool listing failed");
                last_error = e;
            }
        }
        if attempt < LIST_ATTEMPTS {
            tokio::time::sleep(LIST_RETRY_DELAY).await;
        }
    }
    Err(GatewayError::Upstream(format!(
        "listTools failed after {LIST_ATTEMPTS} attempts: {last_error}"
    )))
}

async fn try_list(endpoint: &str) -> Result<Vec<Tool>, String> {
    let transport = StreamableHttpClientTransport::from_uri(endpoint.to_owned());
    let client = client_info()
        .serve(transport)
        .await
        .map_err(|e| e.to_string())?;

    let listed = client.list_tools(Default::default()).await;
    let _ = client.cancel().await;
    listed.map(|result| result.tools).map_err(|e| e.to_string())
}

/// Call one upstream tool with three linearly backed-off attempts and a
/// 30-second wall-clock budget per attempt.
pub async fn call_tool(
    endpoint: &str,
    tool_name: &str,
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<CallToolResult, GatewayError> {
    let mut last_error = String::new();
    for attempt in 1..=CALL_ATTEMPTS {
        match tokio::time::timeout(
            CALL_ATTEMPT_TIMEOUT,
            try_call(endpoint, tool_name, arguments.clone()),
        )
        .await
        {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(e)) => {
                tracing::warn!(endpoint, tool_name, attempt, error = %e, "upstream call failed");
                last_error = e;
            }
            Err(_) => {
                tracing::warn!(endpoint, tool_name, attempt, "upstream call timed out");
                last_error = format!("timed out after {}s", CALL_ATTEMPT_TIMEOUT.as_secs());
            }
        }
        if attempt < CALL_ATTEMPTS {
            // Linear backoff: 1s, 2s.
            tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
        }
    }
    Err(GatewayError::Upstream(format!(
        "callTool {tool_name} failed after {CALL_ATTEMPTS} attempts: {last_error}"
    )))
}

async fn try_call(
    endpoint: &str,
    tool_name: &str,
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<CallToolResult, String> {
    let transport = StreamableHttpClientTransport::from_uri(endpoint.to_owned());
    let client = client_info()
        .serve(transport)
        .await
        .map_err(|e| e.to_string())?;

    let called = client
        .call_tool(CallToolRequestParam {
            meta: None,
            name: tool_name.to_owned().into(),
            arguments,
            task: None,
        })
        .await;
    let _ = client.cancel().await;
    called.map_err(|e| e.to_string())
}
