//! Component tool dispatch through a fake workflow bridge.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_component::ComponentRegistry;
use cascade_component_builtin::builtin_registry;
use cascade_core::{CallId, NodeRef, OrganizationId, RunId};
use cascade_executor::{ExecutorError, ToolCallBridge, ToolCallRequest, ToolCallResult};
use cascade_gateway::{
    CredentialSealer, McpGateway, MemoryKv, RegisterComponent, SessionScope, ToolRegistry,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// Answers every dispatched call immediately with a canned classifier
/// response and records what the workflow would have seen.
struct FakeBridge {
    run_id: RunId,
    organization_id: Option<OrganizationId>,
    requests: Mutex<Vec<ToolCallRequest>>,
    results: DashMap<CallId, ToolCallResult>,
    completions: Mutex<Vec<(NodeRef, String, String)>>,
}

impl FakeBridge {
    fn new(run_id: RunId, organization_id: Option<OrganizationId>) -> Self {
        Self {
            run_id,
            organization_id,
            requests: Mutex::new(Vec::new()),
            results: DashMap::new(),
            completions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ToolCallBridge for FakeBridge {
    async fn execute_tool_call(
        &self,
        _run_id: &RunId,
        request: ToolCallRequest,
    ) -> Result<(), ExecutorError> {
        self.results.insert(
            request.call_id.clone(),
            ToolCallResult::ok(json!({"echoInput": request.arguments, "version": 4})),
        );
        self.requests.lock().push(request);
        Ok(())
    }

    async fn get_tool_call_result(
        &self,
        _run_id: &RunId,
        call_id: &CallId,
    ) -> Option<ToolCallResult> {
        self.results.get(call_id).map(|r| r.clone())
    }

    async fn notify_tool_call_completed(
        &self,
        _run_id: &RunId,
        node_ref: NodeRef,
        tool_name: String,
        _output: Option<Value>,
        _error_message: Option<String>,
        status: String,
    ) -> Result<(), ExecutorError> {
        self.completions.lock().push((node_ref, tool_name, status));
        Ok(())
    }

    async fn run_access(&self, run_id: &RunId) -> Option<Option<OrganizationId>> {
        (run_id == &self.run_id).then_some(self.organization_id)
    }
}

struct Fixture {
    gateway: McpGateway,
    tools: Arc<ToolRegistry>,
    bridge: Arc<FakeBridge>,
    run_id: RunId,
}

fn fixture(registry: ComponentRegistry) -> Fixture {
    let run_id = RunId::generate();
    let kv = Arc::new(MemoryKv::new());
    let sealer = Arc::new(CredentialSealer::from_master_key(&"ab".repeat(32)).unwrap());
    let tools = Arc::new(ToolRegistry::new(kv, sealer));
    let bridge = Arc::new(FakeBridge::new(run_id.clone(), None));
    let gateway = McpGateway::new(tools.clone(), Arc::new(registry), bridge.clone());
    Fixture {
        gateway,
        tools,
        bridge,
        run_id,
    }
}

fn scope(run_id: &RunId, allowed: Option<Vec<String>>) -> SessionScope {
    SessionScope {
        run_id: run_id.clone(),
        organization_id: None,
        agent_id: None,
        allowed_node_ids: allowed,
        expires_at: Utc::now() + chrono::Duration::minutes(5),
    }
}

async fn register_ip_check(f: &Fixture, node_id: &str) {
    f.tools
        .register_component(RegisterComponent {
            run_id: f.run_id.clone(),
            node_id: node_id.into(),
            tool_name: "ip_check".into(),
            component_id: "net.ip_check".into(),
            description: "Classify an IP".into(),
            input_schema: json!({"type": "object"}),
            parameters: json!({"strict": false}),
            credentials: Some(json!({"apiKey": "shhh"})),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn authorize_checks_run_and_organization() {
    let f = fixture(builtin_registry().unwrap());

    // Unknown run.
    let unknown = scope(&RunId::generate(), None);
    assert!(f.gateway.authorize(&unknown).await.is_err());

    // Known run, no org on either side.
    assert!(f.gateway.authorize(&scope(&f.run_id, None)).await.is_ok());

    // Token carries an org the run does not have.
    let mut mismatched = scope(&f.run_id, None);
    mismatched.organization_id = Some(OrganizationId::v4());
    assert!(f.gateway.authorize(&mismatched).await.is_err());
}

#[tokio::test]
async fn dispatch_partitions_arguments_and_resolves_credentials() {
    let f = fixture(builtin_registry().unwrap());
    register_ip_check(&f, "n1").await;

    let server = f.gateway.server_for(&scope(&f.run_id, None), None);
    let tool = f.tools.get_tool(&f.run_id, "n1").await.unwrap();

    // Call through the server's component path directly (the rmcp
    // plumbing adds nothing to the partition semantics).
    let args = json!({
        "ipAddress": "1.2.3.4",   // action-bound
        "strict": true,            // config-bound override
        "apiKey": "agent-injected" // credential-bound: must be dropped
    });
    let result = server
        .call_component(&tool, args.as_object().cloned())
        .await
        .unwrap();
    assert_ne!(result.is_error, Some(true));

    let requests = f.bridge.requests.lock();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    // Partition: actionArgs ∪ paramOverrides = agent keys minus credentials.
    assert_eq!(request.arguments, json!({"ipAddress": "1.2.3.4"}));
    assert_eq!(request.parameters["strict"], json!(true));
    assert!(request.arguments.get("apiKey").is_none());
    assert!(request.parameters.get("apiKey").is_none());

    // Credentials come from the registry, decrypted.
    assert_eq!(
        request.credentials.as_ref().unwrap()["apiKey"],
        json!("shhh")
    );

    // Observational completion fired.
    let completions = f.bridge.completions.lock();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].1, "ip_check");
    assert_eq!(completions[0].2, "completed");
}

#[tokio::test]
async fn call_ids_are_strictly_increasing() {
    let f = fixture(builtin_registry().unwrap());
    register_ip_check(&f, "n1").await;
    let server = f.gateway.server_for(&scope(&f.run_id, None), None);
    let tool = f.tools.get_tool(&f.run_id, "n1").await.unwrap();

    for _ in 0..3 {
        server
            .call_component(&tool, json!({"ipAddress": "1.1.1.1"}).as_object().cloned())
            .await
            .unwrap();
    }

    let requests = f.bridge.requests.lock();
    let stamps: Vec<u64> = requests
        .iter()
        .map(|r| r.call_id.decompose().unwrap().2)
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]), "stamps: {stamps:?}");
}

#[tokio::test]
async fn allowed_node_filter_scopes_the_server() {
    let f = fixture(builtin_registry().unwrap());
    register_ip_check(&f, "n1").await;
    register_ip_check(&f, "n2").await;

    let filtered = f
        .gateway
        .server_for(&scope(&f.run_id, Some(vec!["n2".into()])), None);
    let visible = filtered.visible_tools().await.unwrap();
    assert_eq!(visible.len(), 1);

    let unfiltered = f.gateway.server_for(&scope(&f.run_id, None), None);
    assert_eq!(unfiltered.visible_tools().await.unwrap().len(), 2);
}

#[tokio::test]
async fn distinct_scopes_get_distinct_cached_servers() {
    let f = fixture(builtin_registry().unwrap());
    let all = f.gateway.server_for(&scope(&f.run_id, None), None);
    let some = f
        .gateway
        .server_for(&scope(&f.run_id, Some(vec!["n1".into()])), None);
    let all_again = f.gateway.server_for(&scope(&f.run_id, None), None);

    assert!(all.shares_state_with(&all_again));
    assert!(!all.shares_state_with(&some));
}
