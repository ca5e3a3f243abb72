//! Shared application state and wiring.

use std::sync::Arc;

use cascade_approval::{InMemoryApprovalStore, PauseResumeCoordinator};
use cascade_compiler::Compiler;
use cascade_component::ComponentRegistry;
use cascade_component_builtin::builtin_registry;
use cascade_executor::{
    CapabilitySet, ExecutorDeps, InMemoryRunStore, LocalRuntime, RunStore, SignalRouter,
};
use cascade_gateway::{
    CredentialSealer, KvStore, McpGateway, MemoryKv, RedisKv, SessionTokenStore, ToolRegistry,
};
use cascade_runner::ActionRunner;
use cascade_trace::{InMemoryTraceStore, TraceSink};
use cascade_workflow::{InMemoryWorkflowStore, WorkflowStore};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::auth::{IdentityProvider, StaticAdminProvider};
use crate::capabilities::{MemoryArtifacts, MemorySecrets, MemoryStorage, ReqwestHttp, RunArtifacts};
use crate::config::{ApiConfig, AuthProviderKind};
use crate::error::ApiError;

/// Messages posted into one MCP session's inbound queue.
pub type McpInbound = mpsc::Sender<rmcp::model::ClientJsonRpcMessage>;

/// Everything the handlers need.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ApiConfig>,
    /// Identity provider for user sessions and API keys.
    pub identity: Arc<dyn IdentityProvider>,
    /// Component definitions.
    pub registry: Arc<ComponentRegistry>,
    /// Graph compiler.
    pub compiler: Compiler,
    /// Workflow persistence.
    pub workflows: Arc<dyn WorkflowStore>,
    /// Run persistence.
    pub runs: Arc<dyn RunStore>,
    /// Trace sink.
    pub trace: Arc<TraceSink>,
    /// Approval coordinator.
    pub approvals: Arc<PauseResumeCoordinator>,
    /// The durable runtime.
    pub runtime: Arc<LocalRuntime>,
    /// Per-run tool registry.
    pub tools: Arc<ToolRegistry>,
    /// MCP session tokens.
    pub sessions: Arc<SessionTokenStore>,
    /// The MCP gateway.
    pub gateway: Arc<McpGateway>,
    /// Artifact records.
    pub artifacts: Arc<MemoryArtifacts>,
    /// File storage.
    pub storage: Arc<MemoryStorage>,
    /// Secrets.
    pub secrets: Arc<MemorySecrets>,
    /// Live MCP session inbound queues, keyed by session id.
    pub mcp_sessions: Arc<DashMap<String, McpInbound>>,
}

impl AppState {
    /// Wire the full system from configuration.
    pub async fn build(config: ApiConfig) -> Result<Self, ApiError> {
        let identity: Arc<dyn IdentityProvider> = match config.auth_provider {
            AuthProviderKind::Admin => Arc::new(StaticAdminProvider::new(
                config.admin_username.clone(),
                config.admin_password.clone(),
            )),
            AuthProviderKind::Clerk => {
                // The Clerk integration deploys as an external provider
                // implementation; the core does not embed it.
                return Err(ApiError::configuration(
                    "AUTH_PROVIDER=clerk requires the external provider integration",
                ));
            }
        };

        let kv: Arc<dyn KvStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisKv::connect(url).await?),
            None => Arc::new(MemoryKv::new()),
        };
        let sealer = Arc::new(CredentialSealer::from_master_key(&config.master_key)?);
        let tools = Arc::new(ToolRegistry::new(kv.clone(), sealer));
        let sessions = Arc::new(SessionTokenStore::new(kv));

        let registry = Arc::new(
            builtin_registry()
                .map_err(|e| ApiError::configuration(format!("component registry: {e}")))?,
        );
        let workflows: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
        let runs: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        let trace = Arc::new(TraceSink::new(Arc::new(InMemoryTraceStore::new())));

        let router = Arc::new(SignalRouter::new());
        let approvals = Arc::new(PauseResumeCoordinator::new(
            Arc::new(InMemoryApprovalStore::new()),
            router.clone(),
        ));

        let storage = Arc::new(MemoryStorage::new());
        let secrets = Arc::new(MemorySecrets::new());
        let artifacts = Arc::new(MemoryArtifacts::new());
        let artifacts_for_factory = artifacts.clone();

        let deps = Arc::new(ExecutorDeps {
            registry: registry.clone(),
            runner: Arc::new(ActionRunner::new()),
            trace: trace.clone(),
            approvals: approvals.clone(),
            runs: runs.clone(),
            capabilities: CapabilitySet {
                storage: Some(storage.clone()),
                secrets: Some(secrets.clone()),
                artifacts: Some(Arc::new(
                    move |run_id: &cascade_core::RunId| -> Arc<dyn cascade_component::ArtifactsCapability> {
                        Arc::new(RunArtifacts::new(
                            artifacts_for_factory.clone(),
                            run_id.clone(),
                        ))
                    },
                )),
                http: Some(Arc::new(ReqwestHttp::default())),
            },
        });
        let runtime = Arc::new(LocalRuntime::new(deps, router));
        let gateway = Arc::new(McpGateway::new(
            tools.clone(),
            registry.clone(),
            runtime.clone(),
        ));

        Ok(Self {
            compiler: Compiler::new(registry.clone()),
            config: Arc::new(config),
            identity,
            registry,
            workflows,
            runs,
            trace,
            approvals,
            runtime,
            tools,
            sessions,
            gateway,
            artifacts,
            storage,
            secrets,
            mcp_sessions: Arc::new(DashMap::new()),
        })
    }
}
