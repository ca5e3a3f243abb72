//! The compiled action plan.
//!
//! A plan is the linear, dependency-ordered form of a graph. Its JSON
//! form is deterministic: actions appear in topological order with
//! lexicographic tie-breaking, bindings are sorted by target input, and
//! params are sorted maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cascade_workflow::{GraphEdge, GraphNode, NodeData, WorkflowGraph};

/// A compile-time wiring from a producer's output port to a consumer's
/// input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// Input port on the consuming action.
    pub target_input: String,
    /// Ref of the producing action.
    pub source_ref: String,
    /// Output port on the producing action.
    pub source_output: String,
}

/// One executable step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Stable ref; equal to the originating node id.
    pub r#ref: String,
    /// Component to execute.
    pub component_id: String,
    /// Config-bound values, sorted by key.
    pub params: BTreeMap<String, Value>,
    /// Refs of actions that must complete first, sorted.
    pub depends_on: Vec<String>,
    /// Input wirings, sorted by target input.
    pub bindings: Vec<Binding>,
    /// Keep the run alive when this action fails.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continue_on_error: bool,
}

/// The plan's entrypoint marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    /// Ref of the entry action.
    pub r#ref: String,
}

/// Run-level plan configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    /// Named execution environment.
    pub environment: String,
    /// Overall run deadline, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            environment: "default".into(),
            timeout_seconds: None,
        }
    }
}

/// A compiled, dependency-ordered action plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    /// Plan title, from the graph name.
    pub title: String,
    /// Plan description.
    pub description: String,
    /// The entry action.
    pub entrypoint: Entrypoint,
    /// Actions in fixed topological order.
    pub actions: Vec<Action>,
    /// Run-level configuration.
    pub config: PlanConfig,
}

impl ActionPlan {
    /// Look up an action by ref.
    #[must_use]
    pub fn action(&self, r#ref: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.r#ref == r#ref)
    }

    /// Number of actions.
    #[must_use]
    pub fn total_actions(&self) -> usize {
        self.actions.len()
    }

    /// Reconstruct a workflow graph from this plan.
    ///
    /// Bindings become handled edges; dependencies with no binding
    /// become bare edges. Compiling the reconstruction yields this plan
    /// again (positions and viewport are not part of the plan and come
    /// back zeroed).
    #[must_use]
    pub fn to_graph(&self) -> WorkflowGraph {
        let nodes = self
            .actions
            .iter()
            .map(|action| GraphNode {
                id: action.r#ref.clone(),
                component_id: action.component_id.clone(),
                position: Default::default(),
                data: NodeData {
                    label: action.r#ref.clone(),
                    config: action.params.clone().into_iter().collect(),
                },
            })
            .collect();

        let mut edges = Vec::new();
        for action in &self.actions {
            for binding in &action.bindings {
                edges.push(GraphEdge {
                    id: format!("e-{}-{}", action.r#ref, binding.target_input),
                    source: binding.source_ref.clone(),
                    target: action.r#ref.clone(),
                    source_handle: Some(binding.source_output.clone()),
                    target_handle: Some(binding.target_input.clone()),
                });
            }
            for dep in &action.depends_on {
                let covered = action.bindings.iter().any(|b| &b.source_ref == dep);
                if !covered {
                    edges.push(GraphEdge {
                        id: format!("d-{dep}-{}", action.r#ref),
                        source: dep.clone(),
                        target: action.r#ref.clone(),
                        source_handle: None,
                        target_handle: None,
                    });
                }
            }
        }

        WorkflowGraph {
            name: self.title.clone(),
            description: self.description.clone(),
            nodes,
            edges,
            viewport: Default::default(),
        }
    }
}
