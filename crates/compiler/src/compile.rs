//! Graph → plan compilation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use cascade_component::{ComponentDefinition, ComponentRegistry};
use cascade_workflow::{DependencyGraph, GraphNode, WorkflowGraph};

use crate::error::CompileError;
use crate::plan::{Action, ActionPlan, Binding, Entrypoint, PlanConfig};

/// Config key that marks an action as non-fatal on failure.
const CONTINUE_ON_ERROR_KEY: &str = "continueOnError";

/// Compiles validated graphs into action plans against a fixed registry.
///
/// Compilation is deterministic: the same graph against the same
/// registry produces byte-identical plan JSON. Ordering rules — actions
/// in Kahn order with lexicographic tie-breaking, `depends_on` sorted,
/// bindings sorted by target input, params as sorted maps.
#[derive(Debug, Clone)]
pub struct Compiler {
    registry: Arc<ComponentRegistry>,
}

impl Compiler {
    /// Create a compiler over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    /// Compile a graph into an action plan.
    pub fn compile(&self, graph: &WorkflowGraph) -> Result<ActionPlan, CompileError> {
        graph.validate()?;

        // Every node must resolve to a registered component.
        let mut components: BTreeMap<&str, &Arc<ComponentDefinition>> = BTreeMap::new();
        for node in &graph.nodes {
            let def = self.registry.get(&node.component_id).ok_or_else(|| {
                CompileError::UnknownComponent {
                    node_id: node.id.clone(),
                    component_id: node.component_id.clone(),
                }
            })?;
            components.insert(node.id.as_str(), def);
        }

        let entry_ref = Self::detect_trigger(graph, &components)?;
        let order = Self::topological_order(graph)?;

        let mut actions = Vec::with_capacity(order.len());
        for node_id in &order {
            let node = graph
                .node(node_id)
                .unwrap_or_else(|| unreachable!("ordered node {node_id} came from the graph"));
            let def = components[node_id.as_str()];
            let is_entry = *node_id == entry_ref;
            actions.push(Self::emit_action(graph, node, def, &components, is_entry)?);
        }

        tracing::debug!(
            title = %graph.name,
            actions = actions.len(),
            entry = %entry_ref,
            "compiled action plan"
        );

        Ok(ActionPlan {
            title: graph.name.clone(),
            description: graph.description.clone(),
            entrypoint: Entrypoint { r#ref: entry_ref },
            actions,
            config: PlanConfig::default(),
        })
    }

    /// Exactly one trigger-category node without incoming edges.
    fn detect_trigger(
        graph: &WorkflowGraph,
        components: &BTreeMap<&str, &Arc<ComponentDefinition>>,
    ) -> Result<String, CompileError> {
        let mut candidates: Vec<String> = graph
            .nodes
            .iter()
            .filter(|node| components[node.id.as_str()].is_trigger())
            .filter(|node| graph.incoming(&node.id).next().is_none())
            .map(|node| node.id.clone())
            .collect();
        candidates.sort();

        match candidates.len() {
            0 => Err(CompileError::MissingTrigger),
            1 => Ok(candidates.remove(0)),
            _ => Err(CompileError::AmbiguousTrigger {
                node_ids: candidates,
            }),
        }
    }

    /// Kahn's algorithm with a lexicographically ordered ready set.
    fn topological_order(graph: &WorkflowGraph) -> Result<Vec<String>, CompileError> {
        let mut successors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        for node in &graph.nodes {
            successors.entry(node.id.as_str()).or_default();
            indegree.entry(node.id.as_str()).or_insert(0);
        }
        for edge in &graph.edges {
            // Parallel edges between the same pair count once.
            if successors
                .get_mut(edge.source.as_str())
                .is_some_and(|s| s.insert(edge.target.as_str()))
            {
                *indegree.entry(edge.target.as_str()).or_insert(0) += 1;
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(graph.nodes.len());

        while let Some(&next) = ready.iter().next() {
            ready.remove(next);
            order.push(next.to_owned());
            for &succ in &successors[next] {
                let deg = indegree
                    .get_mut(succ)
                    .unwrap_or_else(|| unreachable!("successor {succ} was seeded"));
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(succ);
                }
            }
        }

        if order.len() == graph.nodes.len() {
            Ok(order)
        } else {
            Err(CompileError::CycleDetected {
                node_ids: DependencyGraph::from_graph(graph).cycle_nodes(),
            })
        }
    }

    /// Resolve bindings and emit one action.
    fn emit_action(
        graph: &WorkflowGraph,
        node: &GraphNode,
        def: &Arc<ComponentDefinition>,
        components: &BTreeMap<&str, &Arc<ComponentDefinition>>,
        is_entry: bool,
    ) -> Result<Action, CompileError> {
        // Edges sorted by id so duplicate-input resolution is stable.
        let mut incoming: Vec<_> = graph.incoming(&node.id).collect();
        incoming.sort_by(|a, b| a.id.cmp(&b.id));

        let mut bindings: Vec<Binding> = Vec::new();
        let mut depends_on: BTreeSet<String> = BTreeSet::new();
        for edge in incoming {
            depends_on.insert(edge.source.clone());

            let target_input = edge
                .target_handle
                .clone()
                .or_else(|| Self::primary_input(def));
            let Some(target_input) = target_input else {
                // No input ports at all — the edge is a bare dependency.
                continue;
            };
            if bindings.iter().any(|b| b.target_input == target_input) {
                // First edge (by id) wins for a contested input.
                continue;
            }
            let source_def = components[edge.source.as_str()];
            let source_output = edge
                .source_handle
                .clone()
                .or_else(|| Self::primary_output(source_def))
                .unwrap_or_else(|| "output".to_owned());
            bindings.push(Binding {
                target_input,
                source_ref: edge.source.clone(),
                source_output,
            });
        }
        bindings.sort_by(|a, b| a.target_input.cmp(&b.target_input));

        let mut params: BTreeMap<String, Value> =
            node.data.config.clone().into_iter().collect();
        let continue_on_error = params
            .remove(CONTINUE_ON_ERROR_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        // Non-entry nodes must have every required input satisfied by an
        // edge, a config value, or a schema default. Credential-bound
        // ports are satisfied by the credential store at dispatch time,
        // never by graph wiring.
        if !is_entry {
            for port in def
                .input_schema
                .required_ports()
                .filter(|p| p.binding != cascade_component::BindingType::Credential)
            {
                let satisfied = bindings.iter().any(|b| b.target_input == port.id)
                    || params.contains_key(&port.id)
                    || port.default.is_some();
                if !satisfied {
                    return Err(CompileError::MissingBinding {
                        node_id: node.id.clone(),
                        input_id: port.id.clone(),
                    });
                }
            }
        }

        Ok(Action {
            r#ref: node.id.clone(),
            component_id: node.component_id.clone(),
            params,
            depends_on: depends_on.into_iter().collect(),
            bindings,
            continue_on_error,
        })
    }

    /// First action-bound input port, the default edge target.
    fn primary_input(def: &ComponentDefinition) -> Option<String> {
        def.input_schema
            .ports
            .iter()
            .find(|p| p.binding == cascade_component::BindingType::Action)
            .map(|p| p.id.clone())
    }

    /// First declared output port, the default edge source.
    fn primary_output(def: &ComponentDefinition) -> Option<String> {
        def.output_schema.ports.first().map(|p| p.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_component::handler::test_support::noop_handler;
    use cascade_component::{
        Category, ComponentDefinition, ConnectionType, ObjectSchema, PortDecl, Primitive,
    };
    use cascade_workflow::{GraphEdge, GraphNode, NodeData};
    use pretty_assertions::assert_eq;

    fn registry() -> Arc<ComponentRegistry> {
        let mut reg = ComponentRegistry::new();
        reg.register(
            ComponentDefinition::new("manual.trigger", "Trigger", Category::Trigger, noop_handler())
                .with_outputs(ObjectSchema::new().with(PortDecl::action(
                    "payload",
                    "Payload",
                    ConnectionType::Any,
                ))),
        )
        .unwrap();
        reg.register(
            ComponentDefinition::new("file.loader", "File Loader", Category::Utility, noop_handler())
                .with_inputs(ObjectSchema::new().with(PortDecl::action(
                    "payload",
                    "Payload",
                    ConnectionType::Any,
                )))
                .with_parameters(ObjectSchema::new().with(PortDecl::config(
                    "fileId",
                    "File",
                    ConnectionType::primitive(Primitive::File),
                )))
                .with_outputs(ObjectSchema::new().with(PortDecl::action(
                    "content",
                    "Content",
                    ConnectionType::Any,
                ))),
        )
        .unwrap();
        reg.register(
            ComponentDefinition::new("scanner.probe", "Probe", Category::Scanner, noop_handler())
                .with_inputs(
                    ObjectSchema::new()
                        .with(PortDecl::action(
                            "target",
                            "Target",
                            ConnectionType::primitive(Primitive::Text),
                        ))
                        .with(
                            PortDecl::action(
                                "depth",
                                "Depth",
                                ConnectionType::primitive(Primitive::Number),
                            )
                            .with_default(serde_json::json!(2)),
                        ),
                )
                .with_outputs(ObjectSchema::new().with(PortDecl::action(
                    "findings",
                    "Findings",
                    ConnectionType::Any,
                ))),
        )
        .unwrap();
        Arc::new(reg)
    }

    fn node(id: &str, component: &str) -> GraphNode {
        GraphNode {
            id: id.into(),
            component_id: component.into(),
            position: Default::default(),
            data: NodeData::default(),
        }
    }

    fn node_with_config(id: &str, component: &str, config: &[(&str, Value)]) -> GraphNode {
        let mut n = node(id, component);
        n.data.config = config
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        n
    }

    fn edge(id: &str, source: &str, target: &str) -> GraphEdge {
        GraphEdge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    fn two_step_graph() -> WorkflowGraph {
        WorkflowGraph {
            name: "recon".into(),
            description: "trigger then load".into(),
            nodes: vec![
                node("trigger", "manual.trigger"),
                node_with_config("loader", "file.loader", &[("fileId", serde_json::json!("f-1"))]),
            ],
            edges: vec![edge("e1", "trigger", "loader")],
            ..WorkflowGraph::default()
        }
    }

    #[test]
    fn happy_path_two_actions() {
        let plan = Compiler::new(registry()).compile(&two_step_graph()).unwrap();

        assert_eq!(plan.entrypoint.r#ref, "trigger");
        assert_eq!(plan.total_actions(), 2);
        assert_eq!(plan.actions[0].r#ref, "trigger");
        assert!(plan.actions[0].depends_on.is_empty());

        let loader = &plan.actions[1];
        assert_eq!(loader.depends_on, vec!["trigger"]);
        assert_eq!(
            loader.bindings,
            vec![Binding {
                target_input: "payload".into(),
                source_ref: "trigger".into(),
                source_output: "payload".into(),
            }]
        );
        assert_eq!(loader.params["fileId"], serde_json::json!("f-1"));
    }

    #[test]
    fn compilation_is_byte_deterministic() {
        let compiler = Compiler::new(registry());
        let graph = two_step_graph();
        let a = serde_json::to_vec(&compiler.compile(&graph).unwrap()).unwrap();
        let b = serde_json::to_vec(&compiler.compile(&graph).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn node_order_in_input_does_not_change_output() {
        let compiler = Compiler::new(registry());
        let graph = two_step_graph();
        let mut shuffled = graph.clone();
        shuffled.nodes.reverse();

        let a = serde_json::to_vec(&compiler.compile(&graph).unwrap()).unwrap();
        let b = serde_json::to_vec(&compiler.compile(&shuffled).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_component_is_reported() {
        let mut graph = two_step_graph();
        graph.nodes[1].component_id = "nope".into();
        let err = Compiler::new(registry()).compile(&graph).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownComponent {
                node_id: "loader".into(),
                component_id: "nope".into(),
            }
        );
        assert_eq!(err.code(), "UnknownComponent");
    }

    #[test]
    fn missing_trigger_is_reported() {
        let graph = WorkflowGraph {
            name: "no entry".into(),
            nodes: vec![node_with_config(
                "loader",
                "file.loader",
                &[("payload", serde_json::json!({}))],
            )],
            ..WorkflowGraph::default()
        };
        let err = Compiler::new(registry()).compile(&graph).unwrap_err();
        assert_eq!(err, CompileError::MissingTrigger);
    }

    #[test]
    fn ambiguous_trigger_is_reported() {
        let graph = WorkflowGraph {
            name: "two entries".into(),
            nodes: vec![node("t1", "manual.trigger"), node("t2", "manual.trigger")],
            ..WorkflowGraph::default()
        };
        let err = Compiler::new(registry()).compile(&graph).unwrap_err();
        assert_eq!(
            err,
            CompileError::AmbiguousTrigger {
                node_ids: vec!["t1".into(), "t2".into()],
            }
        );
    }

    #[test]
    fn trigger_with_incoming_edge_does_not_qualify() {
        let graph = WorkflowGraph {
            name: "looped trigger".into(),
            nodes: vec![
                node("t", "manual.trigger"),
                node_with_config("loader", "file.loader", &[("fileId", serde_json::json!("f"))]),
                node("t2", "manual.trigger"),
            ],
            edges: vec![edge("e1", "t", "loader"), edge("e2", "loader", "t2")],
            ..WorkflowGraph::default()
        };
        // t2 has an incoming edge, so only t qualifies.
        let plan = Compiler::new(registry()).compile(&graph).unwrap();
        assert_eq!(plan.entrypoint.r#ref, "t");
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let graph = WorkflowGraph {
            name: "cyclic".into(),
            nodes: vec![
                node("trigger", "manual.trigger"),
                node_with_config("a", "file.loader", &[("fileId", serde_json::json!("f"))]),
                node_with_config("b", "file.loader", &[("fileId", serde_json::json!("f"))]),
            ],
            edges: vec![
                edge("e1", "trigger", "a"),
                edge("e2", "a", "b"),
                edge("e3", "b", "a"),
            ],
            ..WorkflowGraph::default()
        };
        let err = Compiler::new(registry()).compile(&graph).unwrap_err();
        assert_eq!(
            err,
            CompileError::CycleDetected {
                node_ids: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn missing_binding_is_reported() {
        let graph = WorkflowGraph {
            name: "unbound".into(),
            nodes: vec![node("trigger", "manual.trigger"), node("probe", "scanner.probe")],
            // Bare dependency edge targeting the primary input would bind
            // `target`; route it to `depth` instead so `target` is unbound.
            edges: vec![GraphEdge {
                target_handle: Some("depth".into()),
                ..edge("e1", "trigger", "probe")
            }],
            ..WorkflowGraph::default()
        };
        let err = Compiler::new(registry()).compile(&graph).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingBinding {
                node_id: "probe".into(),
                input_id: "target".into(),
            }
        );
    }

    #[test]
    fn default_satisfies_required_input() {
        let graph = WorkflowGraph {
            name: "defaulted".into(),
            nodes: vec![
                node("trigger", "manual.trigger"),
                node_with_config("probe", "scanner.probe", &[("target", serde_json::json!("example.com"))]),
            ],
            edges: vec![GraphEdge {
                target_handle: Some("target".into()),
                ..edge("e1", "trigger", "probe")
            }],
            ..WorkflowGraph::default()
        };
        // `depth` is required=false via its default; `target` is bound by edge.
        let plan = Compiler::new(registry()).compile(&graph).unwrap();
        assert_eq!(plan.actions[1].bindings[0].target_input, "target");
    }

    #[test]
    fn continue_on_error_extracted_from_config() {
        let graph = WorkflowGraph {
            name: "lenient".into(),
            nodes: vec![
                node("trigger", "manual.trigger"),
                node_with_config(
                    "loader",
                    "file.loader",
                    &[
                        ("fileId", serde_json::json!("f-1")),
                        ("continueOnError", serde_json::json!(true)),
                    ],
                ),
            ],
            edges: vec![edge("e1", "trigger", "loader")],
            ..WorkflowGraph::default()
        };
        let plan = Compiler::new(registry()).compile(&graph).unwrap();
        let loader = plan.action("loader").unwrap();
        assert!(loader.continue_on_error);
        assert!(!loader.params.contains_key("continueOnError"));
    }

    #[test]
    fn diamond_orders_lexicographically_within_level() {
        let graph = WorkflowGraph {
            name: "diamond".into(),
            nodes: vec![
                node("trigger", "manual.trigger"),
                node_with_config("zeta", "file.loader", &[("fileId", serde_json::json!("z"))]),
                node_with_config("alpha", "file.loader", &[("fileId", serde_json::json!("a"))]),
            ],
            edges: vec![edge("e1", "trigger", "zeta"), edge("e2", "trigger", "alpha")],
            ..WorkflowGraph::default()
        };
        let plan = Compiler::new(registry()).compile(&graph).unwrap();
        let refs: Vec<&str> = plan.actions.iter().map(|a| a.r#ref.as_str()).collect();
        assert_eq!(refs, vec!["trigger", "alpha", "zeta"]);
    }

    #[test]
    fn credential_ports_need_no_binding() {
        let mut reg = ComponentRegistry::new();
        reg.register(
            ComponentDefinition::new("manual.trigger", "Trigger", Category::Trigger, noop_handler())
                .with_outputs(ObjectSchema::new().with(PortDecl::action(
                    "payload",
                    "Payload",
                    ConnectionType::Any,
                ))),
        )
        .unwrap();
        reg.register(
            ComponentDefinition::new("net.lookup", "Lookup", Category::Scanner, noop_handler())
                .with_inputs(
                    ObjectSchema::new()
                        .with(PortDecl::action(
                            "target",
                            "Target",
                            ConnectionType::primitive(Primitive::Text),
                        ))
                        .with(PortDecl::credential("apiKey", "API Key")),
                ),
        )
        .unwrap();

        let graph = WorkflowGraph {
            name: "lookup".into(),
            nodes: vec![node("trigger", "manual.trigger"), node("lookup", "net.lookup")],
            edges: vec![GraphEdge {
                target_handle: Some("target".into()),
                ..edge("e1", "trigger", "lookup")
            }],
            ..WorkflowGraph::default()
        };
        // `apiKey` is required but credential-bound: the store satisfies
        // it at dispatch, so compilation succeeds.
        let plan = Compiler::new(Arc::new(reg)).compile(&graph).unwrap();
        assert_eq!(plan.actions[1].bindings.len(), 1);
    }

    #[test]
    fn roundtrip_law_compile_to_graph_compile() {
        let compiler = Compiler::new(registry());
        let plan = compiler.compile(&two_step_graph()).unwrap();
        let replan = compiler.compile(&plan.to_graph()).unwrap();
        assert_eq!(
            serde_json::to_vec(&plan).unwrap(),
            serde_json::to_vec(&replan).unwrap()
        );
    }
}
