//! Dependency analysis over a validated graph.
//!
//! Wraps a petgraph digraph to answer the structural questions the
//! compiler and executor ask: entry/exit nodes, parallelizable levels,
//! and the members of any cycle. Ordering within every returned list is
//! lexicographic by node id so analysis output is reproducible.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::WorkflowGraph;

/// A petgraph-backed view of a workflow graph's dependencies.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the dependency view. The graph must already pass
    /// [`WorkflowGraph::validate`]; unknown edge endpoints are ignored
    /// here rather than re-reported.
    #[must_use]
    pub fn from_graph(workflow: &WorkflowGraph) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in &workflow.nodes {
            let ix = graph.add_node(node.id.clone());
            index.insert(node.id.clone(), ix);
        }
        for edge in &workflow.edges {
            if let (Some(&source), Some(&target)) =
                (index.get(&edge.source), index.get(&edge.target))
            {
                // Parallel edges between the same pair (distinct handles)
                // collapse into a single dependency.
                if !graph.contains_edge(source, target) {
                    graph.add_edge(source, target, ());
                }
            }
        }

        Self { graph, index }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Nodes with no incoming edges, sorted by id.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<String> {
        self.boundary_nodes(Direction::Incoming)
    }

    /// Nodes with no outgoing edges, sorted by id.
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<String> {
        self.boundary_nodes(Direction::Outgoing)
    }

    fn boundary_nodes(&self, direction: Direction) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .graph
            .node_indices()
            .filter(|&ix| self.graph.neighbors_directed(ix, direction).next().is_none())
            .map(|ix| self.graph[ix].clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Direct predecessors of a node, sorted by id.
    #[must_use]
    pub fn predecessors(&self, node_id: &str) -> Vec<String> {
        self.neighbors(node_id, Direction::Incoming)
    }

    /// Direct successors of a node, sorted by id.
    #[must_use]
    pub fn successors(&self, node_id: &str) -> Vec<String> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    fn neighbors(&self, node_id: &str, direction: Direction) -> Vec<String> {
        let Some(&ix) = self.index.get(node_id) else {
            return Vec::new();
        };
        let mut nodes: Vec<String> = self
            .graph
            .neighbors_directed(ix, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Node ids participating in any cycle, sorted. Empty for a DAG.
    ///
    /// Members are strongly connected components of size > 1 plus
    /// self-loops.
    #[must_use]
    pub fn cycle_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&ix| self.graph.contains_edge(ix, ix))
            })
            .flatten()
            .map(|ix| self.graph[ix].clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Parallelizable levels: level `n` holds nodes whose longest
    /// dependency chain has length `n`. Returns `None` when the graph
    /// contains a cycle.
    #[must_use]
    pub fn levels(&self) -> Option<Vec<Vec<String>>> {
        if !self.cycle_nodes().is_empty() {
            return None;
        }

        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        // Process in topological order so predecessors resolve first.
        let order = petgraph::algo::toposort(&self.graph, None).ok()?;
        let mut levels: Vec<Vec<String>> = Vec::new();
        for ix in order {
            let level = self
                .graph
                .neighbors_directed(ix, Direction::Incoming)
                .map(|p| depth[&p] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(ix, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(self.graph[ix].clone());
        }
        for level in &mut levels {
            level.sort();
        }
        Some(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphEdge, GraphNode, WorkflowGraph};
    use pretty_assertions::assert_eq;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
        WorkflowGraph {
            name: "test".into(),
            nodes: nodes
                .iter()
                .map(|id| GraphNode {
                    id: (*id).into(),
                    component_id: "c".into(),
                    position: Default::default(),
                    data: Default::default(),
                })
                .collect(),
            edges: edges
                .iter()
                .enumerate()
                .map(|(i, (s, t))| GraphEdge {
                    id: format!("e{i}"),
                    source: (*s).into(),
                    target: (*t).into(),
                    source_handle: None,
                    target_handle: None,
                })
                .collect(),
            ..WorkflowGraph::default()
        }
    }

    #[test]
    fn linear_chain() {
        let dep = DependencyGraph::from_graph(&graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]));
        assert_eq!(dep.entry_nodes(), vec!["a"]);
        assert_eq!(dep.exit_nodes(), vec!["c"]);
        assert_eq!(
            dep.levels().unwrap(),
            vec![vec!["a"], vec!["b"], vec!["c"]]
        );
        assert!(dep.cycle_nodes().is_empty());
    }

    #[test]
    fn diamond_levels() {
        let dep = DependencyGraph::from_graph(&graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        ));
        assert_eq!(
            dep.levels().unwrap(),
            vec![vec!["a"], vec!["b", "c"], vec!["d"]]
        );
        assert_eq!(dep.predecessors("d"), vec!["b", "c"]);
        assert_eq!(dep.successors("a"), vec!["b", "c"]);
    }

    #[test]
    fn cycle_is_reported() {
        let dep = DependencyGraph::from_graph(&graph(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c"), ("c", "b")],
        ));
        assert_eq!(dep.cycle_nodes(), vec!["b", "c"]);
        assert!(dep.levels().is_none());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let dep = DependencyGraph::from_graph(&graph(&["a", "b"], &[("a", "a"), ("a", "b")]));
        assert_eq!(dep.cycle_nodes(), vec!["a"]);
    }

    #[test]
    fn parallel_edges_collapse() {
        // Two handles between the same pair — one dependency.
        let dep =
            DependencyGraph::from_graph(&graph(&["a", "b"], &[("a", "b"), ("a", "b")]));
        assert_eq!(dep.predecessors("b"), vec!["a"]);
        assert_eq!(dep.levels().unwrap(), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn disconnected_nodes_are_entries_and_exits() {
        let dep = DependencyGraph::from_graph(&graph(&["a", "b"], &[]));
        assert_eq!(dep.entry_nodes(), vec!["a", "b"]);
        assert_eq!(dep.exit_nodes(), vec!["a", "b"]);
        assert_eq!(dep.levels().unwrap(), vec![vec!["a", "b"]]);
    }

    #[test]
    fn unknown_node_has_no_neighbors() {
        let dep = DependencyGraph::from_graph(&graph(&["a"], &[]));
        assert!(dep.predecessors("ghost").is_empty());
        assert!(dep.successors("ghost").is_empty());
    }
}
