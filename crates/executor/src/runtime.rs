//! The durable runtime seam.
//!
//! Durability is delegated to a workflow runtime; [`WorkflowRuntime`]
//! is the contract the rest of the system consumes. [`LocalRuntime`]
//! is the in-process implementation: one tokio task per run, a signal
//! queue processed in receipt order, and every transition journaled
//! through the run store and trace sink. A Temporal-backed adapter
//! implements the same trait and is deployed out of process.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_compiler::ActionPlan;
use cascade_core::{CallId, NodeRef, OrganizationId, RunId, WorkflowId};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::executor::{ExecutorDeps, RunScope, WorkflowExecutor};
use crate::run::{RunRecord, RunStatus, RunStore};
use crate::router::SignalRouter;
use crate::signal::{RunSignal, ToolCallRequest, ToolCallResult};
use crate::toolcall::{RESULT_RETENTION, ToolCallResults};

/// The surface the gateway uses to reach a running workflow.
#[async_trait]
pub trait ToolCallBridge: Send + Sync {
    /// Signal `executeToolCall`.
    async fn execute_tool_call(
        &self,
        run_id: &RunId,
        request: ToolCallRequest,
    ) -> Result<(), ExecutorError>;

    /// Query `getToolCallResult`.
    async fn get_tool_call_result(
        &self,
        run_id: &RunId,
        call_id: &CallId,
    ) -> Option<ToolCallResult>;

    /// Signal the observational `toolCallCompleted`.
    async fn notify_tool_call_completed(
        &self,
        run_id: &RunId,
        node_ref: NodeRef,
        tool_name: String,
        output: Option<Value>,
        error_message: Option<String>,
        status: String,
    ) -> Result<(), ExecutorError>;

    /// The run's owning organization, for session access checks.
    /// `None` when the run does not exist.
    async fn run_access(&self, run_id: &RunId) -> Option<Option<OrganizationId>>;
}

struct LiveRun {
    results: Arc<ToolCallResults>,
    cancellation: CancellationToken,
}

/// Contract for starting and controlling durable runs.
#[async_trait]
pub trait WorkflowRuntime: Send + Sync {
    /// Start a run of a compiled plan. Returns the inserted record.
    async fn start(
        &self,
        workflow_id: WorkflowId,
        plan: ActionPlan,
        inputs: Value,
        organization_id: Option<OrganizationId>,
    ) -> Result<RunRecord, ExecutorError>;

    /// Deliver a signal to a live run.
    async fn signal(&self, run_id: &RunId, signal: RunSignal) -> Result<(), ExecutorError>;

    /// Request cancellation.
    async fn cancel(&self, run_id: &RunId) -> Result<(), ExecutorError>;
}

/// In-process runtime: each run is one tokio task.
pub struct LocalRuntime {
    deps: Arc<ExecutorDeps>,
    router: Arc<SignalRouter>,
    live: Arc<DashMap<RunId, LiveRun>>,
}

impl LocalRuntime {
    /// Create a runtime over shared executor dependencies and the
    /// signal router (also handed to the approval coordinator).
    #[must_use]
    pub fn new(deps: Arc<ExecutorDeps>, router: Arc<SignalRouter>) -> Self {
        Self {
            deps,
            router,
            live: Arc::new(DashMap::new()),
        }
    }

    /// The signal router serving this runtime.
    #[must_use]
    pub fn router(&self) -> &Arc<SignalRouter> {
        &self.router
    }

    /// Number of currently live runs.
    #[must_use]
    pub fn live_runs(&self) -> usize {
        self.live.len()
    }
}

#[async_trait]
impl WorkflowRuntime for LocalRuntime {
    async fn start(
        &self,
        workflow_id: WorkflowId,
        plan: ActionPlan,
        inputs: Value,
        organization_id: Option<OrganizationId>,
    ) -> Result<RunRecord, ExecutorError> {
        let run_id = RunId::generate();
        let now = Utc::now();
        let record = RunRecord {
            run_id: run_id.clone(),
            internal_run_id: format!("local-{}", uuid::Uuid::new_v4().simple()),
            workflow_id,
            total_actions: plan.total_actions() as u32,
            organization_id,
            status: RunStatus::Running,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.deps.runs.insert(record.clone()).await?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        self.router.register(run_id.clone(), signal_tx);

        let results = Arc::new(ToolCallResults::new());
        let cancellation = CancellationToken::new();
        self.live.insert(
            run_id.clone(),
            LiveRun {
                results: results.clone(),
                cancellation: cancellation.clone(),
            },
        );

        let executor = WorkflowExecutor::new(self.deps.clone());
        let scope = RunScope {
            run_id: run_id.clone(),
            workflow_id,
            organization_id,
        };
        let router = self.router.clone();
        let live = self.live.clone();

        tracing::info!(
            run_id = %run_id,
            workflow_id = %workflow_id,
            total_actions = record.total_actions,
            "run started"
        );

        // Long-lived runs accumulate tool-call results; sweep them on
        // the retention cadence until the run record is dropped.
        let sweep = CancellationToken::new();
        {
            let results = results.clone();
            let sweep = sweep.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = sweep.cancelled() => break,
                        () = tokio::time::sleep(RESULT_RETENTION) => {
                            let pruned = results.prune(RESULT_RETENTION);
                            if pruned > 0 {
                                tracing::debug!(pruned, "tool call results pruned");
                            }
                        }
                    }
                }
            });
        }

        tokio::spawn(async move {
            let run_id = scope.run_id.clone();
            executor
                .execute(plan, scope, inputs, signal_rx, cancellation, results)
                .await;
            router.unregister(&run_id);
            // Keep the result map queryable for the poll window.
            tokio::time::sleep(RESULT_RETENTION).await;
            sweep.cancel();
            live.remove(&run_id);
        });

        Ok(record)
    }

    async fn signal(&self, run_id: &RunId, signal: RunSignal) -> Result<(), ExecutorError> {
        self.router.send(run_id, signal)
    }

    async fn cancel(&self, run_id: &RunId) -> Result<(), ExecutorError> {
        // The token preempts the in-flight action; the signal keeps the
        // queue ordering observable to the executor loop.
        if let Some(run) = self.live.get(run_id) {
            run.cancellation.cancel();
        }
        self.router.send(run_id, RunSignal::Cancel)
    }
}

#[async_trait]
impl ToolCallBridge for LocalRuntime {
    async fn execute_tool_call(
        &self,
        run_id: &RunId,
        request: ToolCallRequest,
    ) -> Result<(), ExecutorError> {
        self.router.send(run_id, RunSignal::ExecuteToolCall(request))
    }

    async fn get_tool_call_result(
        &self,
        run_id: &RunId,
        call_id: &CallId,
    ) -> Option<ToolCallResult> {
        self.live.get(run_id).and_then(|run| run.results.get(call_id))
    }

    async fn notify_tool_call_completed(
        &self,
        run_id: &RunId,
        node_ref: NodeRef,
        tool_name: String,
        output: Option<Value>,
        error_message: Option<String>,
        status: String,
    ) -> Result<(), ExecutorError> {
        self.router.send(
            run_id,
            RunSignal::ToolCallCompleted {
                node_ref,
                tool_name,
                output,
                error_message,
                status,
            },
        )
    }

    async fn run_access(&self, run_id: &RunId) -> Option<Option<OrganizationId>> {
        self.deps
            .runs
            .get(run_id)
            .await
            .ok()
            .map(|record| record.organization_id)
    }
}
