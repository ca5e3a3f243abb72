//! Remote HTTP execution.

use std::time::Duration;

use cascade_component::ExecutionContext;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::error::RunnerError;

/// Longest response-body excerpt carried in an error.
const BODY_EXCERPT: usize = 512;

/// POST the action payload to a remote endpoint.
///
/// Auth is a bearer token resolved through the secrets capability.
/// 4xx responses are terminal validation failures; 5xx and transport
/// errors are retryable dependency failures.
pub(crate) async fn run_remote(
    client: &reqwest::Client,
    endpoint: &str,
    auth_secret_id: Option<&str>,
    input: &Value,
    params: &Value,
    ctx: &ExecutionContext,
    timeout: Duration,
) -> Result<Value, RunnerError> {
    let mut request = client
        .post(endpoint)
        .timeout(timeout)
        .json(&serde_json::json!({ "input": input, "params": params }));

    if let Some(secret_id) = auth_secret_id {
        let secret = ctx
            .secrets()?
            .get(secret_id)
            .await?
            .ok_or_else(|| {
                RunnerError::Configuration(format!("auth secret `{secret_id}` not found"))
            })?;
        request = request.bearer_auth(secret.value.expose_secret());
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            RunnerError::Timeout {
                seconds: timeout.as_secs(),
            }
        } else {
            RunnerError::RemoteUnavailable(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(RunnerError::RemoteRejected {
            status: status.as_u16(),
            body: excerpt(&body),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RunnerError::RemoteUnavailable(format!(
            "status {status}: {}",
            excerpt(&body)
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| RunnerError::RemoteUnavailable(format!("malformed response body: {e}")))
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT {
        body.to_owned()
    } else {
        let mut cut = BODY_EXCERPT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &body[..cut])
    }
}
