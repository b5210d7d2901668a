// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution-order computation.
//!
//! Kahn-style topological sort over the committed link table, followed by a
//! stable priority reorder that keeps the topological sequence as its
//! tie-break. Nodes trapped in a cycle are appended in table order with a
//! warning rather than dropped.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::graph::Graph;
use crate::link::LinkId;
use crate::node::NodeId;

/// Compute the evaluation sequence for every node in `graph`.
///
/// Writes each node's `order` (its index in the returned sequence) and, when
/// `compute_levels` is set, its `level` (depth from the source nodes, used by
/// layout). Links whose endpoints do not resolve to live nodes are skipped.
pub(crate) fn compute_execution_order(graph: &mut Graph, compute_levels: bool) -> Vec<NodeId> {
    let mut remaining: IndexMap<NodeId, usize> = IndexMap::with_capacity(graph.nodes.len());
    for (&id, node) in &graph.nodes {
        let incoming = node
            .inputs
            .iter()
            .filter_map(|slot| slot.link)
            .filter_map(|link_id| graph.links.get(&link_id))
            .filter(|link| graph.nodes.contains_key(&link.origin_id))
            .count();
        remaining.insert(id, incoming);
    }

    let mut ready: VecDeque<NodeId> = remaining
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order: Vec<NodeId> = Vec::with_capacity(graph.nodes.len());
    let mut visited_links: IndexSet<LinkId> = IndexSet::new();

    while let Some(id) = ready.pop_front() {
        order.push(id);

        if compute_levels {
            let level = node_level(graph, id);
            if let Some(node) = graph.nodes.get_mut(&id) {
                node.level = level;
            }
        }

        let outgoing: Vec<LinkId> = graph.nodes[&id]
            .outputs
            .iter()
            .flat_map(|slot| slot.links.iter().copied())
            .collect();

        for link_id in outgoing {
            // Fan-out can list the same link from several slots; count once.
            if !visited_links.insert(link_id) {
                continue;
            }
            let Some(link) = graph.links.get(&link_id) else {
                continue;
            };
            let Some(count) = remaining.get_mut(&link.target_id) else {
                // Dangling target. Skipping is the recovery, not a failure.
                continue;
            };
            if *count > 0 {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(link.target_id);
                }
            }
        }
    }

    // Anything never dequeued sits on a cycle. Keep it runnable anyway.
    if order.len() < graph.nodes.len() {
        tracing::warn!(
            stuck = graph.nodes.len() - order.len(),
            "graph contains a cycle; appending unordered nodes"
        );
        let leftovers: Vec<NodeId> = remaining
            .keys()
            .filter(|id| !order.contains(*id))
            .copied()
            .collect();
        for id in leftovers {
            if compute_levels {
                if let Some(node) = graph.nodes.get_mut(&id) {
                    node.level = 0;
                }
            }
            order.push(id);
        }
    }

    // First pass: write the topological index so the priority sort below can
    // fall back to it. The priority sort alone is not a topological sort.
    for (index, id) in order.iter().enumerate() {
        if let Some(node) = graph.nodes.get_mut(id) {
            node.order = index;
        }
    }

    order.sort_by_key(|id| {
        let node = &graph.nodes[id];
        (node.priority, node.order)
    });

    for (index, id) in order.iter().enumerate() {
        if let Some(node) = graph.nodes.get_mut(id) {
            node.order = index;
        }
    }

    order
}

/// Depth of `id`: one past the deepest already-levelled node feeding it.
fn node_level(graph: &Graph, id: NodeId) -> usize {
    let Some(node) = graph.nodes.get(&id) else {
        return 0;
    };
    node.inputs
        .iter()
        .filter_map(|slot| slot.link)
        .filter_map(|link_id| graph.links.get(&link_id))
        .filter_map(|link| graph.nodes.get(&link.origin_id))
        .map(|origin| origin.level + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InputSlot, Node, OutputSlot};

    fn simple_node(name: &str) -> Node {
        let mut node = Node::new(name, name);
        node.inputs.push(InputSlot::new("in", ""));
        node.outputs.push(OutputSlot::new("out", ""));
        node
    }

    fn chain_graph() -> (Graph, NodeId, NodeId, NodeId) {
        // a -> b -> c
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let c = graph.add_node(simple_node("c")).unwrap();
        graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        graph.connect(b, 0, c, 0, None).unwrap().unwrap();
        (graph, a, b, c)
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let (mut graph, a, b, c) = chain_graph();
        let order = graph.compute_execution_order(true);
        assert_eq!(order, vec![a, b, c]);
        assert_eq!(graph.nodes[&a].level, 0);
        assert_eq!(graph.nodes[&b].level, 1);
        assert_eq!(graph.nodes[&c].level, 2);
    }

    #[test]
    fn test_priority_reorders_with_topological_tiebreak() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let c = graph.add_node(simple_node("c")).unwrap();
        // All sources. c's lower priority value moves it first; a and b tie
        // on priority and keep their topological relative order.
        graph.nodes.get_mut(&c).unwrap().priority = -1;

        let order = graph.compute_execution_order(false);
        assert_eq!(order, vec![c, a, b]);
        assert_eq!(graph.nodes[&c].order, 0);
        assert_eq!(graph.nodes[&b].order, 2);
    }

    #[test]
    fn test_cycle_nodes_are_appended_not_lost() {
        let (mut graph, a, b, _c) = chain_graph();
        // close a cycle a -> b -> a
        graph.connect(b, 0, a, 0, None).unwrap().unwrap();
        let order = graph.compute_execution_order(false);
        assert_eq!(order.len(), graph.nodes.len());
    }

    #[test]
    fn test_every_node_appears_exactly_once() {
        let (mut graph, ..) = chain_graph();
        let order = graph.compute_execution_order(false);
        let mut sorted = order.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), order.len());
        assert_eq!(order.len(), graph.nodes.len());
    }
}
