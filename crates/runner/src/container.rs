//! Container-hosted execution.
//!
//! The container host is a seam over the Docker engine so that the
//! dispatch and partial-success policy stay testable without a daemon.
//! Each run gets an isolated scratch volume named
//! `cascade-{tenant}-{run}-{random}`; the volume is removed on every
//! path, success or failure.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use futures::StreamExt;

use crate::error::RunnerError;

/// Where the scratch volume is mounted inside the container.
const WORKSPACE_MOUNT: &str = "/workspace";

/// Env var carrying the serialized action input.
const INPUT_ENV: &str = "CASCADE_INPUT";

/// Grace period before a stuck container is killed.
const STOP_GRACE_SECONDS: i64 = 10;

/// One container execution request.
#[derive(Debug, Clone)]
pub struct ContainerRunSpec {
    /// Image reference.
    pub image: String,
    /// Entrypoint override.
    pub entrypoint: Option<Vec<String>>,
    /// Command arguments.
    pub command: Vec<String>,
    /// Environment variables (the input payload is added on top).
    pub env: BTreeMap<String, String>,
    /// Docker network mode.
    pub network: Option<String>,
    /// Serialized input payload, exported as `CASCADE_INPUT`.
    pub input_payload: String,
    /// Scratch volume name; created and torn down by the host.
    pub volume_name: String,
    /// Wall-clock budget.
    pub timeout: Duration,
    /// Wrap the command in `sh -c` for PTY-expecting tools.
    pub shell_wrapper: bool,
}

/// Captured result of a finished container.
#[derive(Debug, Clone)]
pub struct ContainerRunResult {
    /// Process exit code.
    pub exit_code: i64,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Seam over the container engine.
#[async_trait]
pub trait ContainerHost: Send + Sync {
    /// Run one container to completion, enforcing the requested timeout
    /// and tearing the scratch volume down on all paths.
    async fn run(&self, spec: ContainerRunSpec) -> Result<ContainerRunResult, RunnerError>;
}

/// Docker-backed container host.
pub struct BollardHost {
    docker: Docker,
}

impl BollardHost {
    /// Connect using the local daemon defaults.
    pub fn connect() -> Result<Self, RunnerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RunnerError::ContainerHost(e.to_string()))?;
        Ok(Self { docker })
    }

    async fn collect_logs(&self, container_id: &str) -> (String, String) {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut logs = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(container_id, error = %e, "log collection interrupted");
                    break;
                }
            }
        }
        (stdout, stderr)
    }

    /// Remove the container and volume; failures are logged, not raised.
    async fn teardown(&self, container_id: Option<&str>, volume_name: &str) {
        if let Some(id) = container_id {
            if let Err(e) = self
                .docker
                .remove_container(
                    id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
            {
                tracing::warn!(container_id = id, error = %e, "container removal failed");
            }
        }
        if let Err(e) = self
            .docker
            .remove_volume(volume_name, Some(RemoveVolumeOptions { force: true }))
            .await
        {
            tracing::warn!(volume = volume_name, error = %e, "volume removal failed");
        }
    }
}

#[async_trait]
impl ContainerHost for BollardHost {
    async fn run(&self, spec: ContainerRunSpec) -> Result<ContainerRunResult, RunnerError> {
        let host_err = |e: bollard::errors::Error| RunnerError::ContainerHost(e.to_string());

        self.docker
            .create_volume(CreateVolumeOptions {
                name: spec.volume_name.clone(),
                ..Default::default()
            })
            .await
            .map_err(host_err)?;

        let mut env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.push(format!("{INPUT_ENV}={}", spec.input_payload));

        let (entrypoint, cmd) = if spec.shell_wrapper {
            let joined = spec.command.join(" ");
            (
                Some(vec!["sh".to_owned(), "-c".to_owned()]),
                Some(vec![joined]),
            )
        } else {
            (spec.entrypoint.clone(), Some(spec.command.clone()))
        };

        let config = Config {
            image: Some(spec.image.clone()),
            entrypoint,
            cmd,
            env: Some(env),
            working_dir: Some(WORKSPACE_MOUNT.to_owned()),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:{WORKSPACE_MOUNT}", spec.volume_name)]),
                network_mode: spec.network.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = match self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.volume_name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
        {
            Ok(created) => created,
            Err(e) => {
                self.teardown(None, &spec.volume_name).await;
                return Err(host_err(e));
            }
        };
        let container_id = created.id;

        if let Err(e) = self
            .docker
            .start_container::<String>(&container_id, None)
            .await
        {
            self.teardown(Some(&container_id), &spec.volume_name).await;
            return Err(host_err(e));
        }

        let mut wait = self
            .docker
            .wait_container(&container_id, None::<WaitContainerOptions<String>>);
        let waited = tokio::time::timeout(spec.timeout, wait.next()).await;

        let exit_code = match waited {
            Err(_) => {
                // Deadline passed: stop with grace, then tear down.
                let _ = self
                    .docker
                    .stop_container(
                        &container_id,
                        Some(StopContainerOptions {
                            t: STOP_GRACE_SECONDS,
                        }),
                    )
                    .await;
                self.teardown(Some(&container_id), &spec.volume_name).await;
                return Err(RunnerError::Timeout {
                    seconds: spec.timeout.as_secs(),
                });
            }
            Ok(None) => 0,
            Ok(Some(Ok(response))) => response.status_code,
            // Non-zero exits surface as an error item carrying the code.
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => code,
            Ok(Some(Err(e))) => {
                self.teardown(Some(&container_id), &spec.volume_name).await;
                return Err(host_err(e));
            }
        };

        let (stdout, stderr) = self.collect_logs(&container_id).await;
        self.teardown(Some(&container_id), &spec.volume_name).await;

        Ok(ContainerRunResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// Build the scratch volume name for one action run.
#[must_use]
pub fn volume_name(tenant: &str, run_id: &str) -> String {
    let suffix: u32 = rand::random();
    format!("cascade-{tenant}-{run_id}-{suffix:08x}")
}
