//! Memory graph builder (spec.md §4.4).
//!
//! Produces a node/edge view for rendering and event classification.
//! New relative to the teacher (its interpreter has no equivalent
//! renderable graph), grounded directly on spec.md §4.4; the sort/dedup
//! discipline follows the same pattern as `model.rs`/`diff.rs` — keyed
//! insertion makes duplicates structurally impossible, then a final sort
//! gives the canonical order spec.md §8 requires.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    model::MemoryModel,
    value::{Address, EnvId},
};

/// Unifies environment and heap addresses into one graph-node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Env(EnvId),
    Heap(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: &'static str,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub label: String,
}

/// `buildGraph(model) -> Graph` (spec.md §4.4). Nodes sorted by id; edges
/// sorted by `(from, to, label)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Sentinel returned by consistency-error paths across the graph/explain
/// layers when an address is missing from a graph that should contain it
/// (spec.md §4.9, §7 **Consistency errors**). Never raises.
pub const fn unknown_label() -> &'static str {
    "unknown"
}

impl Graph {
    /// The kind of the node at `id`, or [`unknown_label`] if absent
    /// (spec.md §4.9: the graph layer never raises on a dangling
    /// reference).
    #[must_use]
    pub fn kind_of(&self, id: NodeId) -> &str {
        self.nodes
            .binary_search_by_key(&id, |n| n.id)
            .ok()
            .map_or_else(unknown_label, |i| self.nodes[i].kind)
    }

    #[must_use]
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.binary_search_by_key(&id, |n| n.id).is_ok()
    }

    /// Outgoing edges from `id`, in sorted order.
    #[must_use]
    pub fn outgoing(&self, id: NodeId) -> Vec<&GraphEdge> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }
}

/// `buildGraph(model) -> Graph` (spec.md §6).
#[must_use]
pub fn build_graph(model: &MemoryModel) -> Graph {
    // BTreeMap keyed insertion makes duplicate nodes/edges structurally
    // impossible (spec.md §4.4's "Duplicates are impossible" note).
    let mut nodes: BTreeMap<NodeId, GraphNode> = BTreeMap::new();
    let mut edges: BTreeMap<(NodeId, NodeId, String), GraphEdge> = BTreeMap::new();

    for env in &model.environments {
        let id = NodeId::Env(env.id);
        nodes.insert(id, GraphNode { id, kind: "environment", label: env.id.to_string() });
        for (name, addr) in &env.bindings {
            let to = NodeId::Heap(*addr);
            edges.insert(
                (id, to, name.clone()),
                GraphEdge { from: id, to, label: name.clone() },
            );
        }
    }

    for (addr, node) in &model.heap {
        let id = NodeId::Heap(*addr);
        nodes.insert(id, GraphNode { id, kind: node.kind(), label: node.label() });
        for (label, target) in node.outgoing() {
            let to = NodeId::Heap(target);
            edges.insert((id, to, label.clone()), GraphEdge { from: id, to, label });
        }
        if let crate::model::HeapNodeModel::Function { captured_env, .. } = node {
            let to = NodeId::Env(*captured_env);
            edges.insert(
                (id, to, "closure".to_owned()),
                GraphEdge { from: id, to, label: "closure".to_owned() },
            );
        }
    }

    Graph { nodes: nodes.into_values().collect(), edges: edges.into_values().collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build_model;
    use crate::vm::{Instruction, Opcode, Program, state::VmState};

    #[test]
    fn no_duplicate_nodes_or_edges() {
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let state = VmState::initial(&program);
        let graph = build_graph(&build_model(&state));
        let mut node_ids: Vec<_> = graph.nodes.iter().map(|n| n.id).collect();
        let before = node_ids.len();
        node_ids.dedup();
        assert_eq!(node_ids.len(), before);
    }

    #[test]
    fn node_and_edge_lists_are_sorted() {
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let state = VmState::initial(&program);
        let graph = build_graph(&build_model(&state));
        let mut sorted_nodes = graph.nodes.clone();
        sorted_nodes.sort();
        assert_eq!(graph.nodes, sorted_nodes);
        let mut sorted_edges = graph.edges.clone();
        sorted_edges.sort();
        assert_eq!(graph.edges, sorted_edges);
    }
}
