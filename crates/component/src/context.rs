//! Per-action execution context and its capability seams.
//!
//! The executor builds one context per action; components consume it.
//! Every capability is optional at the interface level — components
//! check presence and fail with a configuration error naming the
//! missing capability. External systems (object storage, secret
//! encryption, log indexing) live behind these traits.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::{ArtifactId, FileId, NodeRef, OrganizationId, RunId};
use secrecy::SecretString;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ComponentError;

/// Severity attached to a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Something degraded but execution continues.
    Warn,
    /// Something failed.
    Error,
}

/// A progress update emitted by a running component.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProgressUpdate {
    /// Human-readable message.
    pub message: String,
    /// Severity; defaults to info.
    pub level: ProgressLevel,
    /// Structured payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProgressUpdate {
    /// An info-level update with just a message.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: ProgressLevel::Info,
            data: None,
        }
    }
}

/// Non-blocking sink for progress updates.
pub trait ProgressSink: Send + Sync {
    /// Deliver one update. Must not block the component.
    fn emit(&self, update: ProgressUpdate);
}

/// A file fetched through the storage capability.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Original file name.
    pub name: String,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// Raw content.
    pub content: Vec<u8>,
}

/// Organization-scoped file storage.
#[async_trait]
pub trait StorageCapability: Send + Sync {
    /// Fetch a file by id. `None` when the id does not resolve within
    /// the calling organization's scope.
    async fn download(&self, id: FileId) -> Result<Option<StoredFile>, ComponentError>;

    /// Store a file, returning its id.
    async fn upload(&self, file: StoredFile) -> Result<FileId, ComponentError>;
}

/// A secret value with its version.
#[derive(Clone)]
pub struct SecretValue {
    /// The secret material.
    pub value: SecretString,
    /// Monotonic version of the stored secret.
    pub version: u32,
}

/// Read access to stored secrets. Implementations fail closed: a
/// missing key is `Ok(None)`, never a default value.
#[async_trait]
pub trait SecretsCapability: Send + Sync {
    /// Resolve a secret by id.
    async fn get(&self, id: &str) -> Result<Option<SecretValue>, ComponentError>;
}

/// An artifact produced by a run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArtifactUpload {
    /// Artifact file name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Raw content.
    pub content: Vec<u8>,
    /// Destinations the artifact should be delivered to.
    #[serde(default)]
    pub destinations: Vec<String>,
    /// Free-form metadata recorded with the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Artifact persistence linked to the current run.
#[async_trait]
pub trait ArtifactsCapability: Send + Sync {
    /// Persist an artifact, returning its record id.
    async fn upload(&self, artifact: ArtifactUpload) -> Result<ArtifactId, ComponentError>;
}

/// Outbound HTTP for external-API components. Timeout and retry
/// semantics live in the implementation, not in components.
#[async_trait]
pub trait HttpCapability: Send + Sync {
    /// POST a JSON body and parse a JSON response.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ComponentError>;

    /// GET a JSON response.
    async fn get_json(&self, url: &str) -> Result<Value, ComponentError>;
}

/// The capability bundle handed to a component for one action.
#[derive(Clone)]
pub struct ExecutionContext {
    /// The run this action belongs to.
    pub run_id: RunId,
    /// The action's ref in the plan.
    pub component_ref: NodeRef,
    /// Owning organization, when the run is org-scoped.
    pub organization_id: Option<OrganizationId>,
    /// Cooperative cancellation; checked between suspension points.
    pub cancellation: CancellationToken,
    storage: Option<Arc<dyn StorageCapability>>,
    secrets: Option<Arc<dyn SecretsCapability>>,
    artifacts: Option<Arc<dyn ArtifactsCapability>>,
    http: Option<Arc<dyn HttpCapability>>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("component_ref", &self.component_ref)
            .field("organization_id", &self.organization_id)
            .field("storage", &self.storage.is_some())
            .field("secrets", &self.secrets.is_some())
            .field("artifacts", &self.artifacts.is_some())
            .field("http", &self.http.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ExecutionContext {
    /// Create a bare context with no capabilities attached.
    #[must_use]
    pub fn new(run_id: RunId, component_ref: NodeRef) -> Self {
        Self {
            run_id,
            component_ref,
            organization_id: None,
            cancellation: CancellationToken::new(),
            storage: None,
            secrets: None,
            artifacts: None,
            http: None,
            progress: None,
        }
    }

    /// Scope the context to an organization.
    #[must_use]
    pub fn with_organization(mut self, org: OrganizationId) -> Self {
        self.organization_id = Some(org);
        self
    }

    /// Replace the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach the storage capability.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StorageCapability>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Attach the secrets capability.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretsCapability>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Attach the artifacts capability.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactsCapability>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Attach the HTTP capability.
    #[must_use]
    pub fn with_http(mut self, http: Arc<dyn HttpCapability>) -> Self {
        self.http = Some(http);
        self
    }

    /// Attach the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Storage, or a configuration error naming the capability.
    pub fn storage(&self) -> Result<&Arc<dyn StorageCapability>, ComponentError> {
        self.storage
            .as_ref()
            .ok_or_else(|| ComponentError::missing_capability("storage"))
    }

    /// Secrets, or a configuration error naming the capability.
    pub fn secrets(&self) -> Result<&Arc<dyn SecretsCapability>, ComponentError> {
        self.secrets
            .as_ref()
            .ok_or_else(|| ComponentError::missing_capability("secrets"))
    }

    /// Artifacts, or a configuration error naming the capability.
    pub fn artifacts(&self) -> Result<&Arc<dyn ArtifactsCapability>, ComponentError> {
        self.artifacts
            .as_ref()
            .ok_or_else(|| ComponentError::missing_capability("artifacts"))
    }

    /// HTTP, or a configuration error naming the capability.
    pub fn http(&self) -> Result<&Arc<dyn HttpCapability>, ComponentError> {
        self.http
            .as_ref()
            .ok_or_else(|| ComponentError::missing_capability("http"))
    }

    /// Emit a progress update; a no-op when no sink is attached.
    pub fn emit_progress(&self, update: ProgressUpdate) {
        if let Some(progress) = &self.progress {
            progress.emit(update);
        }
    }

    /// Fail with `Cancelled` if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), ComponentError> {
        if self.cancellation.is_cancelled() {
            Err(ComponentError::Cancelled)
        } else {
            Ok(())
        }
    }
}
