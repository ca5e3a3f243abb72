//! The user-authored workflow graph.
//!
//! Nodes and edges are stored as two flat arrays keyed by id — the
//! editor's reference graph, not an ownership graph. Acyclicity is a
//! compile-time check, not a structural property of these types.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GraphError;

/// Editor canvas position of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Editor viewport state; round-tripped, never interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
    /// Zoom factor.
    pub zoom: f64,
}

/// Per-node payload: display label plus config-bound values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Config values keyed by parameter port id.
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

/// A node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique node id within the graph.
    pub id: String,
    /// The component this node instantiates.
    pub component_id: String,
    /// Canvas position.
    #[serde(default)]
    pub position: Position,
    /// Label and config payload.
    #[serde(default)]
    pub data: NodeData,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique edge id within the graph.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Output port on the source node; defaults to the primary output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Input port on the target node; defaults to the primary input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

/// A complete workflow graph as authored in the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// Workflow name.
    pub name: String,
    /// Workflow description.
    #[serde(default)]
    pub description: String,
    /// Flat node array.
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Flat edge array.
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    /// Editor viewport, preserved verbatim.
    #[serde(default)]
    pub viewport: Viewport,
}

impl WorkflowGraph {
    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges terminating at the given node.
    pub fn incoming(&self, node_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Edges originating at the given node.
    pub fn outgoing(&self, node_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Check the structural invariants: node ids unique, every edge
    /// endpoint resolves to an existing node.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(GraphError::EmptyNodeId);
            }
            if !seen.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(GraphError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(id: &str, component: &str) -> GraphNode {
        GraphNode {
            id: id.into(),
            component_id: component.into(),
            position: Position::default(),
            data: NodeData::default(),
        }
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

    #[test]
    fn valid_graph_passes() {
        let graph = WorkflowGraph {
            name: "recon".into(),
            nodes: vec![node("a", "trigger"), node("b", "scan")],
            edges: vec![edge("e1", "a", "b")],
            ..WorkflowGraph::default()
        };
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn duplicate_node_id_fails() {
        let graph = WorkflowGraph {
            nodes: vec![node("a", "x"), node("a", "y")],
            ..WorkflowGraph::default()
        };
        assert!(matches!(
            graph.validate(),
            Err(GraphError::DuplicateNodeId { node_id }) if node_id == "a"
        ));
    }

    #[test]
    fn dangling_edge_fails() {
        let graph = WorkflowGraph {
            nodes: vec![node("a", "x")],
            edges: vec![edge("e1", "a", "ghost")],
            ..WorkflowGraph::default()
        };
        assert!(matches!(
            graph.validate(),
            Err(GraphError::DanglingEdge { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn incoming_and_outgoing() {
        let graph = WorkflowGraph {
            nodes: vec![node("a", "x"), node("b", "y"), node("c", "z")],
            edges: vec![edge("e1", "a", "c"), edge("e2", "b", "c")],
            ..WorkflowGraph::default()
        };
        assert_eq!(graph.incoming("c").count(), 2);
        assert_eq!(graph.outgoing("a").count(), 1);
        assert_eq!(graph.incoming("a").count(), 0);
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let graph = WorkflowGraph {
            name: "t".into(),
            nodes: vec![node("a", "trigger")],
            edges: vec![GraphEdge {
                source_handle: Some("payload".into()),
                ..edge("e1", "a", "a")
            }],
            ..WorkflowGraph::default()
        };
        let json = serde_json::to_value(&graph).unwrap();
        assert!(json["nodes"][0].get("componentId").is_some());
        assert!(json["edges"][0].get("sourceHandle").is_some());
    }

    #[test]
    fn serde_roundtrip() {
        let graph = WorkflowGraph {
            name: "roundtrip".into(),
            description: "desc".into(),
            nodes: vec![node("a", "trigger")],
            edges: vec![],
            viewport: Viewport {
                x: 1.0,
                y: 2.0,
                zoom: 0.5,
            },
        };
        let json = serde_json::to_string(&graph).unwrap();
        let back: WorkflowGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);
    }
}
