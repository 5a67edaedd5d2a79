//! TP-016: Emission order.
//!
//! Kahn's algorithm over the node graph with declaration order as the
//! tie-breaker, so the same graph always yields the same sequence. The two
//! presentation modes regroup data-source lookups without ever placing a
//! node ahead of something it depends on.

use super::graph::{Graph, NodeId, NodeKind};
use crate::core::error::{Error, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Topological order; ready nodes are taken lowest declaration index first.
pub fn base_order(graph: &Graph) -> Result<Vec<NodeId>> {
    let n = graph.nodes.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    for node in &graph.nodes {
        for dep in node.dependencies() {
            dependents[dep.0].push(node.id);
            in_degree[node.id.0] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = graph
        .nodes
        .iter()
        .filter(|node| in_degree[node.id.0] == 0)
        .map(|node| Reverse(node.id))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current);
        for next in &dependents[current.0] {
            in_degree[next.0] -= 1;
            if in_degree[next.0] == 0 {
                ready.push(Reverse(*next));
            }
        }
    }

    if order.len() != n {
        return Err(Error::Cycle {
            members: graph
                .nodes
                .iter()
                .filter(|node| in_degree[node.id.0] > 0)
                .map(|node| node.address())
                .collect(),
        });
    }
    Ok(order)
}

/// Emission order for a graph.
///
/// In prompt mode, every node that neither is nor depends on a managed
/// resource, module, or output is hoisted ahead of the rest. Otherwise a data
/// source that something depends on is emitted immediately before its first
/// dependent.
pub fn order(graph: &Graph, prompt: bool) -> Result<Vec<NodeId>> {
    let base = base_order(graph)?;
    let order = if prompt {
        hoist(graph, &base)
    } else {
        inline_data_sources(graph, &base)
    };
    tracing::debug!(module = %graph.name, prompt, nodes = order.len(), "emission order computed");
    Ok(order)
}

fn hoist(graph: &Graph, base: &[NodeId]) -> Vec<NodeId> {
    let mut early = vec![false; graph.nodes.len()];
    for id in base {
        let node = graph.node(*id);
        let late_kind = match &node.kind {
            NodeKind::Resource(r) => !r.data_source,
            NodeKind::Module(_) | NodeKind::Output => true,
            _ => false,
        };
        early[id.0] = !late_kind && node.dependencies().iter().all(|d| early[d.0]);
    }

    let (mut first, second): (Vec<NodeId>, Vec<NodeId>) =
        base.iter().copied().partition(|id| early[id.0]);
    first.extend(second);
    first
}

fn inline_data_sources(graph: &Graph, base: &[NodeId]) -> Vec<NodeId> {
    let mut deferred = vec![false; graph.nodes.len()];
    for node in &graph.nodes {
        for dep in node.dependencies() {
            if graph.node(*dep).is_data_source() {
                deferred[dep.0] = true;
            }
        }
    }

    let mut emitted = vec![false; graph.nodes.len()];
    let mut order = Vec::with_capacity(base.len());
    for id in base {
        if !deferred[id.0] {
            pull(graph, *id, &deferred, &mut emitted, &mut order);
        }
    }
    order
}

/// Emit `root` after any deferred data sources it still waits on.
fn pull(graph: &Graph, root: NodeId, deferred: &[bool], emitted: &mut [bool], order: &mut Vec<NodeId>) {
    // (node, index of the next dependency to look at)
    let mut frames: Vec<(NodeId, usize)> = vec![(root, 0)];
    while let Some(frame) = frames.last_mut() {
        let (id, next) = *frame;
        if emitted[id.0] {
            frames.pop();
            continue;
        }
        match graph.node(id).dependencies().get(next) {
            Some(&dep) => {
                frame.1 += 1;
                if deferred[dep.0] && !emitted[dep.0] {
                    frames.push((dep, 0));
                }
            }
            None => {
                emitted[id.0] = true;
                order.push(id);
                frames.pop();
            }
        }
    }
}
