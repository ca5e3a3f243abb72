//! Remote runner behaviour against a mock HTTP endpoint.

use std::sync::Arc;

use cascade_component::handler::test_support::noop_handler;
use cascade_component::{
    Category, ComponentDefinition, ExecutionContext, RetryPolicy, RunnerSpec, SecretValue,
    SecretsCapability,
};
use cascade_core::{NodeRef, RunId};
use cascade_runner::{ActionRunner, RunnerError};
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_def(endpoint: String, auth_secret_id: Option<String>) -> ComponentDefinition {
    ComponentDefinition::new("remote.probe", "Probe", Category::Integration, noop_handler())
        .with_runner(RunnerSpec::Remote {
            endpoint,
            auth_secret_id,
        })
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            initial_interval_seconds: 0.01,
            backoff_coefficient: 1.0,
            maximum_interval_seconds: 0.01,
            non_retryable_error_kinds: Vec::new(),
        })
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new(RunId::generate(), NodeRef::new("probe").unwrap())
}

struct StaticSecrets;

#[async_trait::async_trait]
impl SecretsCapability for StaticSecrets {
    async fn get(
        &self,
        id: &str,
    ) -> Result<Option<SecretValue>, cascade_component::ComponentError> {
        Ok((id == "probe-token").then(|| SecretValue {
            value: SecretString::from("s3cr3t".to_owned()),
            version: 1,
        }))
    }
}

#[tokio::test]
async fn posts_input_and_params_and_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .and(body_partial_json(json!({"input": {"target": "1.2.3.4"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reachable": true})))
        .expect(1)
        .mount(&server)
        .await;

    let def = remote_def(format!("{}/run", server.uri()), None);
    let outcome = ActionRunner::new()
        .run(&def, json!({"target": "1.2.3.4"}), Value::Null, &ctx())
        .await
        .unwrap();
    assert_eq!(outcome.output().unwrap(), &json!({"reachable": true}));
}

#[tokio::test]
async fn bearer_auth_comes_from_secrets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .and(header("authorization", "Bearer s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let def = remote_def(format!("{}/run", server.uri()), Some("probe-token".into()));
    let ctx = ctx().with_secrets(Arc::new(StaticSecrets));
    ActionRunner::new()
        .run(&def, Value::Null, Value::Null, &ctx)
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_auth_secret_fails_closed() {
    let server = MockServer::start().await;
    let def = remote_def(format!("{}/run", server.uri()), Some("other-token".into()));
    let ctx = ctx().with_secrets(Arc::new(StaticSecrets));
    let err = ActionRunner::new()
        .run(&def, Value::Null, Value::Null, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Configuration(_)));
}

#[tokio::test]
async fn client_errors_are_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unknown target"))
        .expect(1) // no retries
        .mount(&server)
        .await;

    let def = remote_def(format!("{}/run", server.uri()), None);
    let err = ActionRunner::new()
        .run_with_retry(&def, Value::Null, Value::Null, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunnerError::RemoteRejected { status: 422, ref body } if body.contains("unknown target")
    ));
}

#[tokio::test]
async fn server_errors_retry_until_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3) // max_attempts
        .mount(&server)
        .await;

    let def = remote_def(format!("{}/run", server.uri()), None);
    let err = ActionRunner::new()
        .run_with_retry(&def, Value::Null, Value::Null, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::RemoteUnavailable(_)));
}

#[tokio::test]
async fn server_error_then_success_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let def = remote_def(format!("{}/run", server.uri()), None);
    let outcome = ActionRunner::new()
        .run_with_retry(&def, Value::Null, Value::Null, &ctx())
        .await
        .unwrap();
    assert_eq!(outcome.output().unwrap(), &json!({"ok": true}));
}
