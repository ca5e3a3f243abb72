//! The workflow executor: drives one compiled plan to a terminal status.
//!
//! The executor body is written the way a durable-runtime workflow is:
//! every state transition is journaled (run store + trace sink) before
//! the next step, signals are consumed from a single ordered queue, and
//! all waits are library suspension points. Running the same body under
//! a durable runtime adapter replays to the same decisions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cascade_approval::{NewApprovalRequest, PauseResumeCoordinator};
use cascade_compiler::{Action, ActionPlan};
use cascade_component::{
    ArtifactsCapability, ComponentDefinition, ComponentOutcome, ComponentRegistry,
    ExecutionContext, HttpCapability, PendingHumanInput, ProgressLevel, ProgressSink,
    ProgressUpdate, SecretsCapability, StorageCapability,
};
use cascade_core::{NodeRef, OrganizationId, RunId, WorkflowId};
use cascade_runner::ActionRunner;
use cascade_trace::{NewTraceEvent, TraceEventType, TraceLevel, TraceSink};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::run::{ActionState, RunStatus, RunStore};
use crate::signal::{RunSignal, ToolCallRequest, ToolCallResult};
use crate::toolcall::ToolCallResults;

/// Output summaries larger than this are replaced by a size note.
const SUMMARY_LIMIT_BYTES: usize = 8 * 1024;

/// Builds the run-scoped artifacts capability for each run.
pub type ArtifactsFactory = Arc<dyn Fn(&RunId) -> Arc<dyn ArtifactsCapability> + Send + Sync>;

/// Capabilities the executor hands to every action context.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    /// Organization-scoped file storage.
    pub storage: Option<Arc<dyn StorageCapability>>,
    /// Secret resolution.
    pub secrets: Option<Arc<dyn SecretsCapability>>,
    /// Artifact persistence, built per run so records link to the
    /// producing run.
    pub artifacts: Option<ArtifactsFactory>,
    /// Outbound HTTP.
    pub http: Option<Arc<dyn HttpCapability>>,
}

/// Everything the executor needs to drive runs.
pub struct ExecutorDeps {
    /// Component definitions.
    pub registry: Arc<ComponentRegistry>,
    /// Single-action runner.
    pub runner: Arc<ActionRunner>,
    /// Trace event sink.
    pub trace: Arc<TraceSink>,
    /// Approval lifecycle.
    pub approvals: Arc<PauseResumeCoordinator>,
    /// Run persistence.
    pub runs: Arc<dyn RunStore>,
    /// Capability bundle template.
    pub capabilities: CapabilitySet,
}

/// Identity of the run being driven.
#[derive(Debug, Clone)]
pub struct RunScope {
    /// Stable external run id.
    pub run_id: RunId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// Owning organization.
    pub organization_id: Option<OrganizationId>,
}

/// Drives one plan per call; stateless between runs.
#[derive(Clone)]
pub struct WorkflowExecutor {
    deps: Arc<ExecutorDeps>,
}

/// Forwards component progress updates into the trace.
struct TraceProgress {
    trace: Arc<TraceSink>,
    run_id: RunId,
    workflow_id: WorkflowId,
    node_ref: NodeRef,
}

impl ProgressSink for TraceProgress {
    fn emit(&self, update: ProgressUpdate) {
        let trace = self.trace.clone();
        let mut event = NewTraceEvent::new(
            self.run_id.clone(),
            TraceEventType::NodeProgress,
            self.node_ref.clone(),
        )
        .with_workflow(self.workflow_id)
        .with_message(update.message)
        .with_level(match update.level {
            ProgressLevel::Debug => TraceLevel::Debug,
            ProgressLevel::Info => TraceLevel::Info,
            ProgressLevel::Warn => TraceLevel::Warn,
            ProgressLevel::Error => TraceLevel::Error,
        });
        if let Some(data) = update.data {
            event = event.with_data(data);
        }
        tokio::spawn(async move {
            if let Err(e) = trace.append(event).await {
                tracing::warn!(error = %e, "progress trace append failed");
            }
        });
    }
}

enum ActionResult {
    Completed(Value),
    Failed(String),
    RunCancelled,
}

impl WorkflowExecutor {
    /// Create an executor over shared dependencies.
    #[must_use]
    pub fn new(deps: Arc<ExecutorDeps>) -> Self {
        Self { deps }
    }

    /// Drive a plan to a terminal status. Consumes the run's signal
    /// queue; returns the final status after journaling it.
    pub async fn execute(
        &self,
        plan: ActionPlan,
        scope: RunScope,
        inputs: Value,
        mut signals: mpsc::UnboundedReceiver<RunSignal>,
        cancellation: CancellationToken,
        results: Arc<ToolCallResults>,
    ) -> RunStatus {
        let status = match plan.config.timeout_seconds {
            Some(secs) => {
                let deadline = Duration::from_secs(secs);
                match tokio::time::timeout(
                    deadline,
                    self.drive(&plan, &scope, inputs, &mut signals, &cancellation, &results),
                )
                .await
                {
                    Ok(status) => status,
                    Err(_) => {
                        cancellation.cancel();
                        RunStatus::TimedOut
                    }
                }
            }
            None => {
                self.drive(&plan, &scope, inputs, &mut signals, &cancellation, &results)
                    .await
            }
        };

        if matches!(status, RunStatus::Cancelled | RunStatus::TimedOut) {
            match self.deps.approvals.cancel_run(&scope.run_id).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(run_id = %scope.run_id, cancelled = n, "pending approvals cancelled"),
                Err(e) => tracing::warn!(run_id = %scope.run_id, error = %e, "approval cleanup failed"),
            }
        }

        let error = match status {
            RunStatus::TimedOut => Some("run exceeded its deadline".to_owned()),
            _ => None,
        };
        if let Err(e) = self
            .deps
            .runs
            .set_status(&scope.run_id, status, None, error)
            .await
        {
            tracing::warn!(run_id = %scope.run_id, error = %e, "final status write failed");
        }

        tracing::info!(run_id = %scope.run_id, status = %status, "run finished");
        status
    }

    async fn drive(
        &self,
        plan: &ActionPlan,
        scope: &RunScope,
        inputs: Value,
        signals: &mut mpsc::UnboundedReceiver<RunSignal>,
        cancellation: &CancellationToken,
        results: &Arc<ToolCallResults>,
    ) -> RunStatus {
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut states: HashMap<String, ActionState> =
            plan.actions
                .iter()
                .map(|a| (a.r#ref.clone(), ActionState::Pending))
                .collect();

        for (index, action) in plan.actions.iter().enumerate() {
            // Signals that arrived between actions are processed first,
            // in receipt order.
            while let Ok(signal) = signals.try_recv() {
                if self
                    .handle_signal(signal, scope, cancellation, results)
                    .await
                    .run_cancelled()
                {
                    return RunStatus::Cancelled;
                }
            }
            if cancellation.is_cancelled() {
                return RunStatus::Cancelled;
            }

            let Ok(node_ref) = NodeRef::new(action.r#ref.clone()) else {
                // Compiled refs are validated graph node ids.
                return self
                    .fail_run(plan, scope, &mut states, index, "invalid action ref")
                    .await;
            };
            let Some(def) = self.deps.registry.get(&action.component_id).cloned() else {
                self.emit(
                    NewTraceEvent::new(
                        scope.run_id.clone(),
                        TraceEventType::NodeFailed,
                        node_ref,
                    )
                    .with_workflow(scope.workflow_id)
                    .with_error(format!("component not registered: {}", action.component_id)),
                )
                .await;
                return self
                    .fail_run(plan, scope, &mut states, index + 1, "registry drift")
                    .await;
            };

            let is_entry = action.r#ref == plan.entrypoint.r#ref;
            let input = if is_entry {
                inputs.clone()
            } else {
                Self::resolve_input(action, &outputs)
            };
            let params = Value::Object(action.params.clone().into_iter().collect());

            states.insert(action.r#ref.clone(), ActionState::Running);
            self.emit(
                NewTraceEvent::new(
                    scope.run_id.clone(),
                    TraceEventType::NodeStarted,
                    node_ref.clone(),
                )
                .with_workflow(scope.workflow_id),
            )
            .await;

            let result = self
                .run_action(&def, action, &node_ref, input, params, scope, signals, cancellation, results)
                .await;

            match result {
                ActionResult::Completed(output) => {
                    self.emit(
                        NewTraceEvent::new(
                            scope.run_id.clone(),
                            TraceEventType::NodeCompleted,
                            node_ref,
                        )
                        .with_workflow(scope.workflow_id)
                        .with_output_summary(summarize(&output)),
                    )
                    .await;
                    states.insert(action.r#ref.clone(), ActionState::Completed);
                    outputs.insert(action.r#ref.clone(), output);
                }
                ActionResult::Failed(message) => {
                    self.emit(
                        NewTraceEvent::new(
                            scope.run_id.clone(),
                            TraceEventType::NodeFailed,
                            node_ref,
                        )
                        .with_workflow(scope.workflow_id)
                        .with_error(message.clone()),
                    )
                    .await;
                    states.insert(action.r#ref.clone(), ActionState::Failed);
                    if action.continue_on_error {
                        outputs.insert(
                            action.r#ref.clone(),
                            serde_json::json!({ "error": message }),
                        );
                    } else {
                        return self
                            .fail_run(plan, scope, &mut states, index + 1, &message)
                            .await;
                    }
                }
                ActionResult::RunCancelled => {
                    states.insert(action.r#ref.clone(), ActionState::Cancelled);
                    return RunStatus::Cancelled;
                }
            }
        }

        let result: Value = outputs
            .into_iter()
            .collect::<serde_json::Map<String, Value>>()
            .into();
        if let Err(e) = self
            .deps
            .runs
            .set_status(&scope.run_id, RunStatus::Completed, Some(result), None)
            .await
        {
            tracing::warn!(run_id = %scope.run_id, error = %e, "result write failed");
        }
        RunStatus::Completed
    }

    /// Run one action while servicing the signal queue.
    #[allow(clippy::too_many_arguments)]
    async fn run_action(
        &self,
        def: &Arc<ComponentDefinition>,
        action: &Action,
        node_ref: &NodeRef,
        input: Value,
        params: Value,
        scope: &RunScope,
        signals: &mut mpsc::UnboundedReceiver<RunSignal>,
        cancellation: &CancellationToken,
        results: &Arc<ToolCallResults>,
    ) -> ActionResult {
        let ctx = self.action_context(scope, node_ref, cancellation);
        let runner = self.deps.runner.clone();

        let fut = runner.run_with_retry(def, input, params, &ctx);
        tokio::pin!(fut);

        let outcome = loop {
            tokio::select! {
                outcome = &mut fut => break outcome,
                signal = signals.recv() => {
                    match signal {
                        Some(signal) => {
                            if self
                                .handle_signal(signal, scope, cancellation, results)
                                .await
                                .run_cancelled()
                            {
                                // The in-flight action observes the token.
                                continue;
                            }
                        }
                        // Queue closed: the runtime is shutting down.
                        None => {
                            cancellation.cancel();
                            break (&mut fut).await;
                        }
                    }
                }
            }
        };

        match outcome {
            Ok(ComponentOutcome::Completed { output }) => ActionResult::Completed(output),
            Ok(ComponentOutcome::PendingHumanInput(pending)) => {
                self.await_human_input(pending, action, node_ref, scope, signals, cancellation, results)
                    .await
            }
            Err(err) if matches!(err.kind(), cascade_core::ErrorKind::Cancelled) => {
                ActionResult::RunCancelled
            }
            Err(err) => ActionResult::Failed(err.to_string()),
        }
    }

    /// Suspend on a pending approval/selection until its signal,
    /// deadline, or cancellation.
    #[allow(clippy::too_many_arguments)]
    async fn await_human_input(
        &self,
        pending: PendingHumanInput,
        action: &Action,
        node_ref: &NodeRef,
        scope: &RunScope,
        signals: &mut mpsc::UnboundedReceiver<RunSignal>,
        cancellation: &CancellationToken,
        results: &Arc<ToolCallResults>,
    ) -> ActionResult {
        self.emit(
            NewTraceEvent::new(
                scope.run_id.clone(),
                TraceEventType::AwaitingInput,
                node_ref.clone(),
            )
            .with_workflow(scope.workflow_id)
            .with_message(pending.title.clone())
            .with_data(serde_json::json!({
                "requestId": pending.request_id,
                "inputType": pending.input_type,
                "timeoutAt": pending.timeout_at,
            })),
        )
        .await;

        let created = self
            .deps
            .approvals
            .create(NewApprovalRequest {
                id: pending.request_id,
                run_id: scope.run_id.clone(),
                workflow_id: Some(scope.workflow_id),
                node_ref: node_ref.clone(),
                input_type: pending.input_type,
                title: pending.title.clone(),
                description: pending.description.clone(),
                context: pending.context_data.clone(),
                timeout_at: pending.timeout_at,
                organization_id: scope.organization_id,
            })
            .await;
        if let Err(e) = created {
            return ActionResult::Failed(format!("approval registration failed: {e}"));
        }

        let deadline = pending.timeout_at;
        loop {
            let sleep_until = async {
                match deadline {
                    Some(at) => {
                        let remaining = (at - Utc::now())
                            .to_std()
                            .unwrap_or(Duration::ZERO);
                        tokio::time::sleep(remaining).await;
                    }
                    // No deadline: wait indefinitely.
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                signal = signals.recv() => {
                    match signal {
                        Some(RunSignal::HumanInputResolved(resolution))
                            if resolution.request_id == pending.request_id =>
                        {
                            let envelope = serde_json::json!({
                                "approved": resolution.approved,
                                "rejected": !resolution.approved,
                                "selection": resolution.selection,
                                "respondedBy": resolution.responded_by,
                                "respondedAt": resolution.responded_at,
                                "responseNote": resolution.response_note,
                            });
                            return ActionResult::Completed(envelope);
                        }
                        Some(signal) => {
                            if self
                                .handle_signal(signal, scope, cancellation, results)
                                .await
                                .run_cancelled()
                            {
                                return ActionResult::RunCancelled;
                            }
                        }
                        None => return ActionResult::RunCancelled,
                    }
                }
                () = sleep_until => {
                    match self.deps.approvals.expire(pending.request_id).await {
                        Ok(_) => {
                            return ActionResult::Failed(format!(
                                "approval expired for {}", action.r#ref
                            ));
                        }
                        // Resolved at the wire just before the deadline:
                        // keep waiting for the in-flight signal.
                        Err(e) => {
                            tracing::debug!(
                                approval_id = %pending.request_id,
                                error = %e,
                                "deadline raced a resolution; awaiting signal"
                            );
                            tokio::select! {
                                signal = signals.recv() => {
                                    if let Some(RunSignal::HumanInputResolved(resolution)) = signal {
                                        if resolution.request_id == pending.request_id {
                                            return ActionResult::Completed(serde_json::json!({
                                                "approved": resolution.approved,
                                                "rejected": !resolution.approved,
                                                "selection": resolution.selection,
                                                "respondedBy": resolution.responded_by,
                                                "respondedAt": resolution.responded_at,
                                                "responseNote": resolution.response_note,
                                            }));
                                        }
                                    }
                                    return ActionResult::Failed(format!(
                                        "approval expired for {}", action.r#ref
                                    ));
                                }
                                () = tokio::time::sleep(Duration::from_secs(5)) => {
                                    return ActionResult::Failed(format!(
                                        "approval expired for {}", action.r#ref
                                    ));
                                }
                            }
                        }
                    }
                }
                () = cancellation.cancelled() => return ActionResult::RunCancelled,
            }
        }
    }

    /// Handle one out-of-band signal. Returns whether the run must stop.
    async fn handle_signal(
        &self,
        signal: RunSignal,
        scope: &RunScope,
        cancellation: &CancellationToken,
        results: &Arc<ToolCallResults>,
    ) -> SignalDisposition {
        match signal {
            RunSignal::Cancel => {
                cancellation.cancel();
                SignalDisposition::RunCancelled
            }
            RunSignal::ExecuteToolCall(request) => {
                self.dispatch_tool_call(request, scope, cancellation, results)
                    .await;
                SignalDisposition::Handled
            }
            RunSignal::ToolCallCompleted {
                node_ref,
                tool_name,
                output,
                error_message,
                status,
            } => {
                let level = if error_message.is_some() {
                    TraceLevel::Error
                } else {
                    TraceLevel::Info
                };
                self.emit(
                    NewTraceEvent::new(
                        scope.run_id.clone(),
                        TraceEventType::NodeProgress,
                        node_ref,
                    )
                    .with_workflow(scope.workflow_id)
                    .with_level(level)
                    .with_message(format!("tool {tool_name} {status}"))
                    .with_data(serde_json::json!({
                        "toolName": tool_name,
                        "status": status,
                        "output": output.map(|o| summarize(&o)),
                        "error": error_message,
                    })),
                )
                .await;
                SignalDisposition::Handled
            }
            RunSignal::HumanInputResolved(resolution) => {
                // No pause is waiting on this id right now; the record
                // is authoritative, so this is only noise.
                tracing::warn!(
                    run_id = %scope.run_id,
                    request_id = %resolution.request_id,
                    "human input resolution with no waiting action"
                );
                SignalDisposition::Handled
            }
        }
    }

    /// Execute an agent tool call against the runner, storing the
    /// result envelope under its call id.
    async fn dispatch_tool_call(
        &self,
        request: ToolCallRequest,
        scope: &RunScope,
        cancellation: &CancellationToken,
        results: &Arc<ToolCallResults>,
    ) {
        if !results.claim(&request.call_id) {
            tracing::debug!(call_id = %request.call_id, "duplicate tool call ignored");
            return;
        }

        let Some(def) = self.deps.registry.get(&request.component_id).cloned() else {
            results.complete(
                &request.call_id,
                ToolCallResult::failed(format!(
                    "component not registered: {}",
                    request.component_id
                )),
            );
            return;
        };

        self.emit(
            NewTraceEvent::new(
                scope.run_id.clone(),
                TraceEventType::NodeStarted,
                request.node_id.clone(),
            )
            .with_workflow(scope.workflow_id)
            .with_message("agent tool call".to_owned()),
        )
        .await;

        // Credential-bound values merge into the input after agent
        // arguments so agents can never shadow them.
        let mut input = request.arguments.clone();
        if let (Some(obj), Some(Value::Object(credentials))) =
            (input.as_object_mut(), request.credentials.as_ref())
        {
            for (key, value) in credentials {
                obj.insert(key.clone(), value.clone());
            }
        }

        let ctx = self.action_context(scope, &request.node_id, cancellation);
        let outcome = self
            .deps
            .runner
            .run_with_retry(&def, input, request.parameters.clone(), &ctx)
            .await;

        match outcome {
            Ok(ComponentOutcome::Completed { output }) => {
                self.emit(
                    NewTraceEvent::new(
                        scope.run_id.clone(),
                        TraceEventType::NodeCompleted,
                        request.node_id.clone(),
                    )
                    .with_workflow(scope.workflow_id)
                    .with_output_summary(summarize(&output)),
                )
                .await;
                results.complete(&request.call_id, ToolCallResult::ok(output));
            }
            Ok(ComponentOutcome::PendingHumanInput(_)) => {
                // Agent-dispatched calls cannot pause; agents poll with
                // a bounded window.
                let message = "tool call suspended on human input; not supported".to_owned();
                self.emit(
                    NewTraceEvent::new(
                        scope.run_id.clone(),
                        TraceEventType::NodeFailed,
                        request.node_id.clone(),
                    )
                    .with_workflow(scope.workflow_id)
                    .with_error(message.clone()),
                )
                .await;
                results.complete(&request.call_id, ToolCallResult::failed(message));
            }
            Err(err) => {
                self.emit(
                    NewTraceEvent::new(
                        scope.run_id.clone(),
                        TraceEventType::NodeFailed,
                        request.node_id.clone(),
                    )
                    .with_workflow(scope.workflow_id)
                    .with_error(err.to_string()),
                )
                .await;
                results.complete(&request.call_id, ToolCallResult::failed(err.to_string()));
            }
        }
    }

    /// Mark every not-yet-started action skipped and fail the run.
    async fn fail_run(
        &self,
        plan: &ActionPlan,
        scope: &RunScope,
        states: &mut HashMap<String, ActionState>,
        from_index: usize,
        message: &str,
    ) -> RunStatus {
        for action in plan.actions.iter().skip(from_index) {
            if states.get(&action.r#ref) == Some(&ActionState::Pending) {
                states.insert(action.r#ref.clone(), ActionState::Skipped);
                if let Ok(node_ref) = NodeRef::new(action.r#ref.clone()) {
                    self.emit(
                        NewTraceEvent::new(
                            scope.run_id.clone(),
                            TraceEventType::NodeSkipped,
                            node_ref,
                        )
                        .with_workflow(scope.workflow_id)
                        .with_message("skipped after upstream failure"),
                    )
                    .await;
                }
            }
        }
        tracing::warn!(run_id = %scope.run_id, error = message, "run failed");
        RunStatus::Failed
    }

    fn action_context(
        &self,
        scope: &RunScope,
        node_ref: &NodeRef,
        cancellation: &CancellationToken,
    ) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(scope.run_id.clone(), node_ref.clone())
            .with_cancellation(cancellation.child_token())
            .with_progress(Arc::new(TraceProgress {
                trace: self.deps.trace.clone(),
                run_id: scope.run_id.clone(),
                workflow_id: scope.workflow_id,
                node_ref: node_ref.clone(),
            }));
        if let Some(org) = scope.organization_id {
            ctx = ctx.with_organization(org);
        }
        let caps = &self.deps.capabilities;
        if let Some(storage) = &caps.storage {
            ctx = ctx.with_storage(storage.clone());
        }
        if let Some(secrets) = &caps.secrets {
            ctx = ctx.with_secrets(secrets.clone());
        }
        if let Some(artifacts) = &caps.artifacts {
            ctx = ctx.with_artifacts(artifacts(&scope.run_id));
        }
        if let Some(http) = &caps.http {
            ctx = ctx.with_http(http.clone());
        }
        ctx
    }

    /// Wire each bound input from the producing action's outputs.
    fn resolve_input(action: &Action, outputs: &HashMap<String, Value>) -> Value {
        let mut input = serde_json::Map::new();
        for binding in &action.bindings {
            let Some(source) = outputs.get(&binding.source_ref) else {
                continue;
            };
            let value = source
                .get(&binding.source_output)
                .cloned()
                .unwrap_or_else(|| source.clone());
            input.insert(binding.target_input.clone(), value);
        }
        Value::Object(input)
    }

    async fn emit(&self, event: NewTraceEvent) {
        if let Err(e) = self.deps.trace.append(event).await {
            tracing::warn!(error = %e, "trace append failed");
        }
    }
}

enum SignalDisposition {
    Handled,
    RunCancelled,
}

impl SignalDisposition {
    fn run_cancelled(&self) -> bool {
        matches!(self, Self::RunCancelled)
    }
}

/// Bound the size of trace output summaries.
fn summarize(output: &Value) -> Value {
    let serialized = output.to_string();
    if serialized.len() > SUMMARY_LIMIT_BYTES {
        serde_json::json!({
            "truncated": true,
            "bytes": serialized.len(),
        })
    } else {
        output.clone()
    }
}
