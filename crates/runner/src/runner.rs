//! Action dispatch and retry.

use std::sync::Arc;
use std::time::Duration;

use cascade_component::{
    ComponentDefinition, ComponentOutcome, ExecutionContext, ProgressLevel, ProgressUpdate,
    RunnerSpec,
};
use serde_json::Value;

use crate::container::{ContainerHost, ContainerRunSpec, volume_name};
use crate::error::RunnerError;
use crate::remote::run_remote;

/// Deadline applied when neither the runner spec nor the plan sets one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs single actions under the component's runner strategy.
#[derive(Clone)]
pub struct ActionRunner {
    container_host: Option<Arc<dyn ContainerHost>>,
    http: reqwest::Client,
    default_timeout: Duration,
}

impl Default for ActionRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRunner {
    /// Create a runner with no container host attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            container_host: None,
            http: reqwest::Client::new(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Attach a container host for container-spec components.
    #[must_use]
    pub fn with_container_host(mut self, host: Arc<dyn ContainerHost>) -> Self {
        self.container_host = Some(host);
        self
    }

    /// Override the default action deadline.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run one attempt of an action.
    pub async fn run(
        &self,
        def: &ComponentDefinition,
        input: Value,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, RunnerError> {
        ctx.check_cancelled().map_err(RunnerError::from)?;
        match &def.runner {
            RunnerSpec::Inline => self.run_inline(def, input, params, ctx).await,
            RunnerSpec::Container {
                image,
                entrypoint,
                command,
                env,
                network,
                timeout_seconds,
                shell_wrapper,
            } => {
                let spec = ContainerRunSpec {
                    image: image.clone(),
                    entrypoint: entrypoint.clone(),
                    command: command.clone(),
                    env: env.clone(),
                    network: network.clone(),
                    input_payload: serde_json::json!({ "input": input, "params": params })
                        .to_string(),
                    volume_name: volume_name(
                        &ctx.organization_id
                            .map_or_else(|| "public".to_owned(), |org| org.to_string()),
                        ctx.run_id.as_str(),
                    ),
                    timeout: Duration::from_secs(*timeout_seconds),
                    shell_wrapper: *shell_wrapper,
                };
                self.run_container(spec, ctx).await
            }
            RunnerSpec::Remote {
                endpoint,
                auth_secret_id,
            } => {
                let output = run_remote(
                    &self.http,
                    endpoint,
                    auth_secret_id.as_deref(),
                    &input,
                    &params,
                    ctx,
                    self.default_timeout,
                )
                .await?;
                Ok(ComponentOutcome::completed(output))
            }
        }
    }

    /// Run an action under the component's retry policy, sleeping the
    /// policy's backoff between attempts and honouring cancellation.
    pub async fn run_with_retry(
        &self,
        def: &ComponentDefinition,
        input: Value,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, RunnerError> {
        let policy = &def.retry_policy;
        let mut attempt = 1u32;
        loop {
            match self.run(def, input.clone(), params.clone(), ctx).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    let kind = err.kind();
                    if !policy.should_retry(kind, attempt) {
                        return Err(err);
                    }
                    let delay = policy.delay_for_attempt(attempt + 1);
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        component_ref = %ctx.component_ref,
                        component_id = %def.id,
                        attempt,
                        kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "action attempt failed, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = ctx.cancellation.cancelled() => return Err(RunnerError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn run_inline(
        &self,
        def: &ComponentDefinition,
        input: Value,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, RunnerError> {
        let deadline = self.default_timeout;
        tokio::select! {
            result = tokio::time::timeout(deadline, def.handler.execute(input, params, ctx)) => {
                match result {
                    Ok(outcome) => outcome.map_err(RunnerError::from),
                    Err(_) => Err(RunnerError::Timeout { seconds: deadline.as_secs() }),
                }
            }
            () = ctx.cancellation.cancelled() => Err(RunnerError::Cancelled),
        }
    }

    async fn run_container(
        &self,
        spec: ContainerRunSpec,
        ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, RunnerError> {
        let host = self.container_host.as_ref().ok_or_else(|| {
            RunnerError::Configuration("no container host configured".to_owned())
        })?;

        let result = host.run(spec).await?;
        let stdout = result.stdout.trim();

        if result.exit_code == 0 {
            return Ok(ComponentOutcome::completed(parse_stdout(stdout)));
        }

        if !stdout.is_empty() {
            // Recon tools often emit useful findings before exiting
            // non-zero; surface them with a warning instead of failing.
            ctx.emit_progress(ProgressUpdate {
                message: format!(
                    "container exited with code {} but produced output; keeping partial results",
                    result.exit_code
                ),
                level: ProgressLevel::Warn,
                data: Some(serde_json::json!({ "exitCode": result.exit_code })),
            });
            let mut output = parse_stdout(stdout);
            if let Some(obj) = output.as_object_mut() {
                obj.insert("partial".into(), Value::Bool(true));
                obj.insert("exitCode".into(), serde_json::json!(result.exit_code));
            }
            return Ok(ComponentOutcome::completed(output));
        }

        Err(RunnerError::Container {
            exit_code: result.exit_code,
            stderr: result.stderr.chars().take(2048).collect(),
        })
    }
}

/// Interpret container stdout: JSON when it parses, otherwise the raw
/// text under a `stdout` key.
fn parse_stdout(stdout: &str) -> Value {
    serde_json::from_str(stdout)
        .unwrap_or_else(|_| serde_json::json!({ "stdout": stdout }))
}

impl std::fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRunner")
            .field("container_host", &self.container_host.is_some())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
