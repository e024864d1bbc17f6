//! Flow graph validation.
//!
//! Checks the §3.3 invariants before a run: exactly one start node, unique
//! node names, edge endpoints that exist, and acyclicity once loop-body
//! edges are set aside (a loop edge legitimately re-enters the graph).

use std::collections::HashMap;

use petgraph::graph::DiGraph;

use crate::error::{FlowError, FlowResult};
use crate::ident::Id;
use crate::model::{Edge, FlowNode, NodeKind, NoopKind, NoopNode};

/// Validate a flow's nodes and edges; returns the start node id.
pub fn validate_flow(
    nodes: &[FlowNode],
    noops: &[NoopNode],
    edges: &[Edge],
) -> FlowResult<Id> {
    let mut names: HashMap<&str, Id> = HashMap::new();
    for node in nodes {
        if names.insert(node.name.as_str(), node.id).is_some() {
            return Err(FlowError::DuplicateNodeName(node.name.clone()));
        }
    }

    let start = find_start_node(nodes, noops)?;

    let node_ids: HashMap<Id, ()> = nodes.iter().map(|n| (n.id, ())).collect();
    for edge in edges {
        for endpoint in [edge.source_id, edge.target_id] {
            if !node_ids.contains_key(&endpoint) {
                return Err(FlowError::EdgeEndpointMissing {
                    edge_id: edge.id.to_string(),
                    node_id: endpoint.to_string(),
                });
            }
        }
    }

    check_acyclic(nodes, edges)?;

    Ok(start)
}

/// Locate the single `NO_OP / START` node.
pub fn find_start_node(nodes: &[FlowNode], noops: &[NoopNode]) -> FlowResult<Id> {
    let mut start = None;
    for node in nodes.iter().filter(|n| n.kind == NodeKind::NoOp) {
        let is_start = noops
            .iter()
            .any(|noop| noop.flow_node_id == node.id && noop.noop_kind == NoopKind::Start);
        if is_start {
            if start.is_some() {
                return Err(FlowError::MultipleStartNodes);
            }
            start = Some(node.id);
        }
    }
    start.ok_or(FlowError::NoStartNode)
}

fn check_acyclic(nodes: &[FlowNode], edges: &[Edge]) -> FlowResult<()> {
    let mut graph = DiGraph::<Id, ()>::new();
    let mut indices = HashMap::new();
    for node in nodes {
        indices.insert(node.id, graph.add_node(node.id));
    }
    for edge in edges {
        if edge.source_handle == crate::model::Handle::Loop {
            continue;
        }
        if let (Some(&s), Some(&t)) = (indices.get(&edge.source_id), indices.get(&edge.target_id)) {
            graph.add_edge(s, t, ());
        }
    }
    petgraph::algo::toposort(&graph, None)
        .map(|_| ())
        .map_err(|_| FlowError::CycleDetected)
}
