//! In-process capability implementations.
//!
//! Object storage (MinIO/S3) and the secret store are external
//! collaborators; these implementations satisfy the same traits for
//! tests and single-process deployments. The HTTP capability is the
//! real one, backed by reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cascade_core::{ArtifactId, FileId, RunId};
use cascade_component::{
    ArtifactUpload, ArtifactsCapability, ComponentError, HttpCapability, SecretValue,
    SecretsCapability, StorageCapability, StoredFile,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;
use serde_json::Value;

/// In-memory file storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: DashMap<FileId, StoredFile>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file (tests, fixtures).
    pub fn put(&self, id: FileId, file: StoredFile) {
        self.files.insert(id, file);
    }
}

#[async_trait]
impl StorageCapability for MemoryStorage {
    async fn download(&self, id: FileId) -> Result<Option<StoredFile>, ComponentError> {
        Ok(self.files.get(&id).map(|f| f.clone()))
    }

    async fn upload(&self, file: StoredFile) -> Result<FileId, ComponentError> {
        let id = FileId::v4();
        self.files.insert(id, file);
        Ok(id)
    }
}

/// In-memory secret map, seeded at startup.
#[derive(Debug, Default)]
pub struct MemorySecrets {
    secrets: DashMap<String, (String, u32)>,
}

impl MemorySecrets {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or rotate a secret.
    pub fn put(&self, id: impl Into<String>, value: impl Into<String>) {
        let id = id.into();
        let version = self.secrets.get(&id).map_or(1, |existing| existing.1 + 1);
        self.secrets.insert(id, (value.into(), version));
    }
}

#[async_trait]
impl SecretsCapability for MemorySecrets {
    async fn get(&self, id: &str) -> Result<Option<SecretValue>, ComponentError> {
        Ok(self.secrets.get(id).map(|entry| SecretValue {
            value: SecretString::from(entry.0.clone()),
            version: entry.1,
        }))
    }
}

/// An artifact record linked to a run.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    /// Record id.
    pub id: ArtifactId,
    /// The producing run.
    pub run_id: RunId,
    /// Artifact name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Content size in bytes.
    pub size: usize,
    /// Delivery destinations.
    pub destinations: Vec<String>,
    /// Free-form metadata.
    pub metadata: Option<Value>,
    /// When the artifact was written.
    pub created_at: DateTime<Utc>,
}

/// In-memory artifact store; records one entry per upload, scoped to
/// the run that produced it.
#[derive(Debug, Default)]
pub struct MemoryArtifacts {
    records: DashMap<ArtifactId, ArtifactRecord>,
}

impl MemoryArtifacts {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one run.
    #[must_use]
    pub fn list_by_run(&self, run_id: &RunId) -> Vec<ArtifactRecord> {
        let mut records: Vec<ArtifactRecord> = self
            .records
            .iter()
            .filter(|r| &r.run_id == run_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }
}

/// The artifacts capability for one run, writing into the shared store.
pub struct RunArtifacts {
    store: Arc<MemoryArtifacts>,
    run_id: RunId,
}

impl RunArtifacts {
    /// Scope the shared store to a run.
    #[must_use]
    pub fn new(store: Arc<MemoryArtifacts>, run_id: RunId) -> Self {
        Self { store, run_id }
    }
}

#[async_trait]
impl ArtifactsCapability for RunArtifacts {
    async fn upload(&self, artifact: ArtifactUpload) -> Result<ArtifactId, ComponentError> {
        let id = ArtifactId::v4();
        self.store.records.insert(
            id,
            ArtifactRecord {
                id,
                run_id: self.run_id.clone(),
                name: artifact.name,
                mime_type: artifact.mime_type,
                size: artifact.content.len(),
                destinations: artifact.destinations,
                metadata: artifact.metadata,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }
}

/// Outbound HTTP with a request deadline, for external-API components.
pub struct ReqwestHttp {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for ReqwestHttp {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ReqwestHttp {
    /// Create a client with the given per-request deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn classify(&self, e: &reqwest::Error) -> ComponentError {
        if e.is_timeout() {
            ComponentError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ComponentError::dependency(e.to_string())
        }
    }
}

#[async_trait]
impl HttpCapability for ReqwestHttp {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ComponentError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;
        response
            .json()
            .await
            .map_err(|e| ComponentError::dependency(e.to_string()))
    }

    async fn get_json(&self, url: &str) -> Result<Value, ComponentError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;
        response
            .json()
            .await
            .map_err(|e| ComponentError::dependency(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn storage_roundtrip() {
        let storage = MemoryStorage::new();
        let id = storage
            .upload(StoredFile {
                name: "x.txt".into(),
                mime_type: None,
                content: b"abc".to_vec(),
            })
            .await
            .unwrap();
        let file = storage.download(id).await.unwrap().unwrap();
        assert_eq!(file.name, "x.txt");
        assert!(storage.download(FileId::v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn secrets_version_on_rotation() {
        let secrets = MemorySecrets::new();
        secrets.put("token", "v1");
        secrets.put("token", "v2");

        let secret = secrets.get("token").await.unwrap().unwrap();
        assert_eq!(secret.version, 2);
        assert!(secrets.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn artifacts_scope_to_their_run() {
        let store = Arc::new(MemoryArtifacts::new());
        let run_a = RunId::generate();
        let run_b = RunId::generate();

        RunArtifacts::new(store.clone(), run_a.clone())
            .upload(ArtifactUpload {
                name: "subdomains.txt".into(),
                mime_type: "text/plain".into(),
                content: b"a.example.com".to_vec(),
                destinations: vec!["s3".into()],
                metadata: None,
            })
            .await
            .unwrap();

        assert_eq!(store.list_by_run(&run_a).len(), 1);
        assert!(store.list_by_run(&run_b).is_empty());
        assert_eq!(store.list_by_run(&run_a)[0].size, 13);
    }
}
