//! Workflow persistence contract.
//!
//! Database persistence is an external collaborator; this module states
//! the contract (the logical `workflows` / `workflow_versions` tables)
//! and ships the in-memory implementation used by tests and
//! single-process deployments.

use async_trait::async_trait;
use cascade_core::{OrganizationId, WorkflowId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowStoreError;
use crate::graph::WorkflowGraph;

/// A stored workflow at its latest version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    /// Workflow id.
    pub id: WorkflowId,
    /// Owning organization, when org-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    /// Latest version number, starting at 1.
    pub version: u32,
    /// The graph at the latest version.
    pub graph: WorkflowGraph,
    /// Compiled plan persisted by the last commit of this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_definition: Option<Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// One historical version of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowVersion {
    /// Version number.
    pub version: u32,
    /// The graph as of this version.
    pub graph: WorkflowGraph,
    /// Compiled plan, when this version was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_definition: Option<Value>,
    /// When this version was written.
    pub created_at: DateTime<Utc>,
}

/// Persistence seam for workflows and their versions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Create a workflow from a validated graph. Version starts at 1.
    async fn create(
        &self,
        graph: WorkflowGraph,
        organization_id: Option<OrganizationId>,
    ) -> Result<WorkflowRecord, WorkflowStoreError>;

    /// Replace the graph, bumping the version and keeping the prior
    /// version readable.
    async fn replace(
        &self,
        id: WorkflowId,
        graph: WorkflowGraph,
    ) -> Result<WorkflowRecord, WorkflowStoreError>;

    /// Fetch the latest version.
    async fn get(&self, id: WorkflowId) -> Result<WorkflowRecord, WorkflowStoreError>;

    /// Fetch a specific version.
    async fn get_version(
        &self,
        id: WorkflowId,
        version: u32,
    ) -> Result<WorkflowVersion, WorkflowStoreError>;

    /// Record the compiled plan for the current version.
    async fn set_compiled(
        &self,
        id: WorkflowId,
        compiled: Value,
    ) -> Result<WorkflowRecord, WorkflowStoreError>;

    /// List all workflows at their latest versions.
    async fn list(&self) -> Result<Vec<WorkflowRecord>, WorkflowStoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    record: WorkflowRecord,
    versions: Vec<WorkflowVersion>,
}

/// In-memory workflow store.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: DashMap<WorkflowId, Entry>,
}

impl InMemoryWorkflowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(
        &self,
        graph: WorkflowGraph,
        organization_id: Option<OrganizationId>,
    ) -> Result<WorkflowRecord, WorkflowStoreError> {
        graph.validate()?;
        let now = Utc::now();
        let record = WorkflowRecord {
            id: WorkflowId::v4(),
            organization_id,
            version: 1,
            graph: graph.clone(),
            compiled_definition: None,
            created_at: now,
            updated_at: now,
        };
        self.workflows.insert(
            record.id,
            Entry {
                record: record.clone(),
                versions: vec![WorkflowVersion {
                    version: 1,
                    graph,
                    compiled_definition: None,
                    created_at: now,
                }],
            },
        );
        Ok(record)
    }

    async fn replace(
        &self,
        id: WorkflowId,
        graph: WorkflowGraph,
    ) -> Result<WorkflowRecord, WorkflowStoreError> {
        graph.validate()?;
        let mut entry = self
            .workflows
            .get_mut(&id)
            .ok_or(WorkflowStoreError::NotFound { workflow_id: id })?;
        let now = Utc::now();
        entry.record.version += 1;
        entry.record.graph = graph.clone();
        entry.record.compiled_definition = None;
        entry.record.updated_at = now;
        let version = entry.record.version;
        entry.versions.push(WorkflowVersion {
            version,
            graph,
            compiled_definition: None,
            created_at: now,
        });
        Ok(entry.record.clone())
    }

    async fn get(&self, id: WorkflowId) -> Result<WorkflowRecord, WorkflowStoreError> {
        self.workflows
            .get(&id)
            .map(|e| e.record.clone())
            .ok_or(WorkflowStoreError::NotFound { workflow_id: id })
    }

    async fn get_version(
        &self,
        id: WorkflowId,
        version: u32,
    ) -> Result<WorkflowVersion, WorkflowStoreError> {
        let entry = self
            .workflows
            .get(&id)
            .ok_or(WorkflowStoreError::NotFound { workflow_id: id })?;
        entry
            .versions
            .iter()
            .find(|v| v.version == version)
            .cloned()
            .ok_or(WorkflowStoreError::VersionNotFound {
                workflow_id: id,
                version,
            })
    }

    async fn set_compiled(
        &self,
        id: WorkflowId,
        compiled: Value,
    ) -> Result<WorkflowRecord, WorkflowStoreError> {
        let mut entry = self
            .workflows
            .get_mut(&id)
            .ok_or(WorkflowStoreError::NotFound { workflow_id: id })?;
        entry.record.compiled_definition = Some(compiled.clone());
        entry.record.updated_at = Utc::now();
        let version = entry.record.version;
        if let Some(v) = entry.versions.iter_mut().find(|v| v.version == version) {
            v.compiled_definition = Some(compiled);
        }
        Ok(entry.record.clone())
    }

    async fn list(&self) -> Result<Vec<WorkflowRecord>, WorkflowStoreError> {
        let mut records: Vec<WorkflowRecord> =
            self.workflows.iter().map(|e| e.record.clone()).collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphNode, WorkflowGraph};

    fn simple_graph() -> WorkflowGraph {
        WorkflowGraph {
            name: "wf".into(),
            nodes: vec![GraphNode {
                id: "a".into(),
                component_id: "trigger".into(),
                position: Default::default(),
                data: Default::default(),
            }],
            ..WorkflowGraph::default()
        }
    }

    #[tokio::test]
    async fn create_starts_at_version_one() {
        let store = InMemoryWorkflowStore::new();
        let record = store.create(simple_graph(), None).await.unwrap();
        assert_eq!(record.version, 1);
        assert!(record.compiled_definition.is_none());
    }

    #[tokio::test]
    async fn replace_bumps_version_and_keeps_history() {
        let store = InMemoryWorkflowStore::new();
        let record = store.create(simple_graph(), None).await.unwrap();

        let mut updated = simple_graph();
        updated.name = "wf v2".into();
        let replaced = store.replace(record.id, updated).await.unwrap();
        assert_eq!(replaced.version, 2);
        assert_eq!(replaced.graph.name, "wf v2");

        let v1 = store.get_version(record.id, 1).await.unwrap();
        assert_eq!(v1.graph.name, "wf");
    }

    #[tokio::test]
    async fn replace_invalidates_compiled_definition() {
        let store = InMemoryWorkflowStore::new();
        let record = store.create(simple_graph(), None).await.unwrap();
        store
            .set_compiled(record.id, serde_json::json!({"title": "wf"}))
            .await
            .unwrap();

        let replaced = store.replace(record.id, simple_graph()).await.unwrap();
        assert!(replaced.compiled_definition.is_none());
    }

    #[tokio::test]
    async fn get_missing_fails_not_found() {
        let store = InMemoryWorkflowStore::new();
        let err = store.get(WorkflowId::v4()).await.unwrap_err();
        assert!(matches!(err, WorkflowStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn invalid_graph_rejected_on_create() {
        let store = InMemoryWorkflowStore::new();
        let mut graph = simple_graph();
        graph.nodes.push(graph.nodes[0].clone());
        assert!(store.create(graph, None).await.is_err());
    }

    #[tokio::test]
    async fn missing_version_fails() {
        let store = InMemoryWorkflowStore::new();
        let record = store.create(simple_graph(), None).await.unwrap();
        let err = store.get_version(record.id, 9).await.unwrap_err();
        assert!(matches!(err, WorkflowStoreError::VersionNotFound { .. }));
    }
}
