// SPDX-License-Identifier: MIT OR Apache-2.0
//! Packing a selection into a subgraph and unpacking it back.
//!
//! Packing extracts the selected items into a new [`Subgraph`] definition and
//! leaves a proxy node in their place. Boundary links are collapsed by
//! distinct endpoint: N links fanning out from one external output become a
//! single parent-graph link into one proxy port, fanning back out inside the
//! subgraph (and symmetrically for outputs). Unpacking is the inverse, with
//! fresh ids for everything that re-enters the parent graph.

use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

use crate::error::GraphError;
use crate::geometry::{self, Rect};
use crate::graph::Graph;
use crate::group::GroupId;
use crate::link::{Link, LinkId};
use crate::node::{Node, NodeId};
use crate::reroute::{self, RerouteId};
use crate::settings::{MAX_NODES, NODE_TITLE_HEIGHT, NODE_WIDTH};
use crate::subgraph::Subgraph;

/// The positionable items a conversion operates on.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected nodes
    pub nodes: IndexSet<NodeId>,
    /// Selected groups
    pub groups: IndexSet<GroupId>,
    /// Explicitly selected reroutes
    pub reroutes: IndexSet<RerouteId>,
}

impl Selection {
    /// A selection of just the given nodes.
    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add a group to the selection.
    pub fn with_group(mut self, id: GroupId) -> Self {
        self.groups.insert(id);
        self
    }

    /// Add a reroute to the selection.
    pub fn with_reroute(mut self, id: RerouteId) -> Self {
        self.reroutes.insert(id);
        self
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.groups.is_empty() && self.reroutes.is_empty()
    }
}

/// What a successful pack produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackResult {
    /// The new definition's id
    pub subgraph_id: Uuid,
    /// The proxy node standing in for the selection
    pub proxy_node_id: NodeId,
}

/// What a successful unpack produced.
#[derive(Debug, Clone, Default)]
pub struct UnpackResult {
    /// Nodes added to the parent graph
    pub node_ids: Vec<NodeId>,
    /// Groups added to the parent graph
    pub group_ids: Vec<GroupId>,
    /// Reroutes added to the parent graph
    pub reroute_ids: Vec<RerouteId>,
}

/// A boundary link captured before the tables change, with its full reroute
/// chain (ordered origin-first).
#[derive(Debug, Clone)]
struct BoundaryLink {
    link: Link,
    chain: Vec<RerouteId>,
}

/// Extract `selection` into a new subgraph definition and put a proxy node in
/// its place.
///
/// Boundary connectivity is preserved: each distinct external endpoint feeding
/// the selection becomes one imported port, each distinct internal origin
/// exporting from it becomes one exported port. Reroutes fully inside the
/// selection move with it; chains crossing the boundary are split at it.
pub fn convert_to_subgraph(
    graph: &mut Graph,
    selection: &Selection,
) -> Result<PackResult, GraphError> {
    if selection.is_empty() {
        return Err(GraphError::EmptySelection);
    }
    let selected_nodes: IndexSet<NodeId> = selection
        .nodes
        .iter()
        .copied()
        .filter(|id| graph.nodes.contains_key(id))
        .collect();
    if selected_nodes.is_empty() {
        return Err(GraphError::EmptySelection);
    }

    // Classify every committed link against the selection.
    let mut internal_links: Vec<Link> = Vec::new();
    let mut boundary_in: Vec<Link> = Vec::new();
    let mut boundary_out: Vec<Link> = Vec::new();
    for link in graph.links.values() {
        let origin_inside = selected_nodes.contains(&link.origin_id);
        let target_inside = selected_nodes.contains(&link.target_id);
        match (origin_inside, target_inside) {
            (true, true) => internal_links.push(link.clone()),
            (false, true) => boundary_in.push(link.clone()),
            (true, false) => boundary_out.push(link.clone()),
            (false, false) => {}
        }
    }
    let internal_link_ids: IndexSet<LinkId> = internal_links.iter().map(|l| l.id).collect();

    // Reroutes that move: explicitly selected ones plus any whose links are
    // all internal.
    let mut moved_reroutes: IndexSet<RerouteId> = selection
        .reroutes
        .iter()
        .copied()
        .filter(|id| graph.reroutes.contains_key(id))
        .collect();
    for (&id, reroute) in &graph.reroutes {
        if !reroute.link_ids.is_empty()
            && reroute.floating_link_ids.is_empty()
            && reroute.link_ids.iter().all(|l| internal_link_ids.contains(l))
        {
            moved_reroutes.insert(id);
        }
    }

    // Capture boundary chains before any table changes.
    let boundary_in = capture_chains(graph, boundary_in)?;
    let boundary_out = capture_chains(graph, boundary_out)?;

    let bounds = selection_bounds(graph, &selected_nodes, &moved_reroutes, &selection.groups)
        .ok_or(GraphError::EmptySelection)?;

    let subgraph_id = Uuid::new_v4();
    let mut sub = Subgraph::new(subgraph_id, "Subgraph");

    // Move the selected items into the definition.
    for link in &boundary_in {
        graph.links.shift_remove(&link.link.id);
    }
    for link in &boundary_out {
        graph.links.shift_remove(&link.link.id);
    }
    for id in &selected_nodes {
        if let Some(node) = graph.nodes.shift_remove(id) {
            if let NodeId::Number(n) = node.id {
                sub.graph.state.last_node_id = sub.graph.state.last_node_id.max(n);
            }
            sub.graph.nodes.insert(node.id, node);
        }
    }
    for link in internal_links {
        sub.graph.state.last_link_id = sub.graph.state.last_link_id.max(link.id);
        let mut link = graph.links.shift_remove(&link.id).unwrap_or(link);
        if let Some(parent) = link.parent_id {
            if !moved_reroutes.contains(&parent) {
                // The nearest waypoint stays outside; the moved link cannot
                // keep a chain it can no longer reach.
                link.parent_id = None;
            }
        }
        sub.graph.links.insert(link.id, link);
    }
    for id in &moved_reroutes {
        if let Some(reroute) = graph.reroutes.shift_remove(id) {
            sub.graph.state.last_reroute_id = sub.graph.state.last_reroute_id.max(reroute.id);
            sub.graph.reroutes.insert(reroute.id, reroute);
        }
    }
    for group_id in &selection.groups {
        if let Some(index) = graph.groups.iter().position(|g| g.id == *group_id) {
            let group = graph.groups.remove(index);
            sub.graph.state.last_group_id = sub.graph.state.last_group_id.max(group.id);
            sub.graph.groups.push(group);
        }
    }

    // Floating links that referenced a moved node do not survive the pack.
    let dropped_floating: Vec<LinkId> = graph
        .floating_links
        .values()
        .filter(|link| {
            selected_nodes.contains(&link.origin_id) || selected_nodes.contains(&link.target_id)
        })
        .map(|link| link.id)
        .collect();
    for link_id in dropped_floating {
        tracing::warn!(link = link_id, "dropping floating link attached to packed node");
        graph.floating_links.shift_remove(&link_id);
    }

    // One imported port per distinct external origin endpoint.
    let mut input_reconnects: Vec<(NodeId, usize, usize, Option<RerouteId>)> = Vec::new();
    for (endpoint, links) in group_by_endpoint(&boundary_in, |link| (link.origin_id, link.origin_slot)) {
        let (origin_id, origin_slot) = endpoint;
        let (name, data_type) = external_output_label(graph, origin_id, origin_slot)
            .unwrap_or_else(|| (format!("in{}", sub.inputs.len()), links[0].link.data_type.clone()));
        let port = sub.add_input(name, data_type);

        let mut external_tip: Option<RerouteId> = None;
        for (index, boundary) in links.iter().enumerate() {
            let (moved, external): (Vec<RerouteId>, Vec<RerouteId>) = boundary
                .chain
                .iter()
                .partition(|id| moved_reroutes.contains(*id));
            if index == 0 {
                external_tip = external.last().copied();
            }

            sub.graph.state.last_link_id += 1;
            let id = sub.graph.state.last_link_id;
            let mut link = Link::new(
                id,
                NodeId::SUBGRAPH_INPUT,
                port as i32,
                boundary.link.target_id,
                boundary.link.target_slot,
                &boundary.link.data_type,
            );
            link.parent_id = moved.last().copied();
            for reroute_id in &moved {
                if let Some(reroute) = sub.graph.reroutes.get_mut(reroute_id) {
                    reroute.link_ids.insert(id);
                }
            }
            sub.graph.links.insert(id, link);
        }
        if let Ok(slot) = usize::try_from(origin_slot) {
            input_reconnects.push((origin_id, slot, port, external_tip));
        }
    }

    // One exported port per distinct internal origin endpoint.
    let mut output_reconnects: Vec<(usize, NodeId, usize, Option<RerouteId>)> = Vec::new();
    for (endpoint, links) in group_by_endpoint(&boundary_out, |link| (link.origin_id, link.origin_slot)) {
        let (origin_id, origin_slot) = endpoint;
        let (name, data_type) = internal_output_label(&sub, origin_id, origin_slot)
            .unwrap_or_else(|| (format!("out{}", sub.outputs.len()), links[0].link.data_type.clone()));
        let port = sub.add_output(name, data_type);

        // A single internal link feeds the boundary; fan-out happens outside.
        let first = &links[0];
        let (moved, _): (Vec<RerouteId>, Vec<RerouteId>) = first
            .chain
            .iter()
            .partition(|id| moved_reroutes.contains(*id));
        sub.graph.state.last_link_id += 1;
        let id = sub.graph.state.last_link_id;
        let mut link = Link::new(
            id,
            origin_id,
            origin_slot,
            NodeId::SUBGRAPH_OUTPUT,
            port as i32,
            &first.link.data_type,
        );
        link.parent_id = moved.last().copied();
        for reroute_id in &moved {
            if let Some(reroute) = sub.graph.reroutes.get_mut(reroute_id) {
                reroute.link_ids.insert(id);
            }
        }
        sub.graph.links.insert(id, link);

        for boundary in &links {
            let external: Vec<RerouteId> = boundary
                .chain
                .iter()
                .copied()
                .filter(|id| !moved_reroutes.contains(id))
                .collect();
            if let Ok(slot) = usize::try_from(boundary.link.target_slot) {
                output_reconnects.push((
                    port,
                    boundary.link.target_id,
                    slot,
                    external.last().copied(),
                ));
            }
        }
    }

    // Chains were split at the boundary; clear parents that crossed it.
    clear_dangling_parents(&mut sub.graph);
    clear_dangling_parents(graph);

    // Proxy node centred on the old selection, corrected for the title bar.
    let mut proxy = sub.create_proxy_node();
    let centre = bounds.centre();
    proxy.pos = [
        centre[0] - proxy.size[0] * 0.5,
        centre[1] - proxy.size[1] * 0.5 + NODE_TITLE_HEIGHT * 0.5,
    ];
    sub.input_node_pos = [bounds.x - NODE_WIDTH - 100.0, centre[1]];
    sub.output_node_pos = [bounds.right() + 100.0, centre[1]];
    let proxy_node_id = graph.add_node(proxy)?;

    for (origin_id, origin_slot, port, after) in input_reconnects {
        let _ = graph.connect(origin_id, origin_slot, proxy_node_id, port, after)?;
    }
    for (port, target_id, target_slot, after) in output_reconnects {
        let _ = graph.connect(proxy_node_id, port, target_id, target_slot, after)?;
    }

    sub.graph.rebuild_link_references();
    sub.graph.prune_invalid_reroutes();
    sub.graph.compute_execution_order(false);

    graph.rebuild_link_references();
    graph.prune_invalid_reroutes();
    graph.compute_execution_order(false);

    graph.subgraphs.insert(subgraph_id, sub);
    graph.mark_dirty();

    Ok(PackResult {
        subgraph_id,
        proxy_node_id,
    })
}

/// Replace a proxy node with the contents of its subgraph definition.
///
/// Everything re-enters the parent graph under fresh ids. Boundary links are
/// spliced back onto the external links that fed the proxy; reroute chains
/// contributed by both sides are joined at the seam. Unresolvable ids and
/// cyclic chains abort with an error, leaving no partial result guarantees
/// beyond the tables staying internally consistent.
pub fn unpack_subgraph(graph: &mut Graph, proxy_node_id: NodeId) -> Result<UnpackResult, GraphError> {
    let Some(proxy) = graph.nodes.get(&proxy_node_id).cloned() else {
        return Err(GraphError::BrokenIdLink(format!(
            "no such node: {proxy_node_id}"
        )));
    };
    let subgraph_id = proxy
        .subgraph_id()
        .ok_or(GraphError::NotASubgraphNode(proxy_node_id))?;
    let definition = graph
        .subgraphs
        .get(&subgraph_id)
        .cloned()
        .ok_or(GraphError::SubgraphNotFound(subgraph_id))?;

    // Offset that keeps the unpacked contents centred where the proxy sat.
    let proxy_centre = proxy.bounding_rect().centre();
    let delta = match definition_bounds(&definition.graph) {
        Some(content) => {
            let centre = content.centre();
            [proxy_centre[0] - centre[0], proxy_centre[1] - centre[1]]
        }
        None => proxy.pos,
    };

    // Capture the external links feeding and fed by the proxy.
    let mut inputs_by_port: IndexMap<usize, BoundaryLink> = IndexMap::new();
    for (port, slot) in proxy.inputs.iter().enumerate() {
        let Some(link_id) = slot.link else { continue };
        let link = graph
            .links
            .get(&link_id)
            .cloned()
            .ok_or_else(|| GraphError::BrokenIdLink(format!("missing link {link_id}")))?;
        let chain = reroute::chain_to_origin(&graph.reroutes, link.parent_id)
            .ok_or(GraphError::RerouteCycle(link.parent_id.unwrap_or(-1)))?;
        inputs_by_port.insert(port, BoundaryLink { link, chain });
    }
    let mut outputs_by_port: IndexMap<usize, Vec<BoundaryLink>> = IndexMap::new();
    for (port, slot) in proxy.outputs.iter().enumerate() {
        for &link_id in &slot.links {
            let link = graph
                .links
                .get(&link_id)
                .cloned()
                .ok_or_else(|| GraphError::BrokenIdLink(format!("missing link {link_id}")))?;
            let chain = reroute::chain_to_origin(&graph.reroutes, link.parent_id)
                .ok_or(GraphError::RerouteCycle(link.parent_id.unwrap_or(-1)))?;
            outputs_by_port
                .entry(port)
                .or_default()
                .push(BoundaryLink { link, chain });
        }
    }

    // The proxy and its external links go away; the chains stay for splicing.
    for boundary in inputs_by_port.values() {
        graph.links.shift_remove(&boundary.link.id);
    }
    for boundary in outputs_by_port.values().flatten() {
        graph.links.shift_remove(&boundary.link.id);
    }
    let proxy_floating: Vec<LinkId> = graph
        .floating_links
        .values()
        .filter(|link| link.origin_id == proxy_node_id || link.target_id == proxy_node_id)
        .map(|link| link.id)
        .collect();
    for link_id in proxy_floating {
        graph.remove_floating_link(link_id);
    }
    graph.nodes.shift_remove(&proxy_node_id);

    // Clone the definition's contents under fresh parent-graph ids.
    let mut result = UnpackResult::default();
    let mut node_map: IndexMap<NodeId, NodeId> = IndexMap::new();
    for node in definition.graph.nodes.values() {
        if graph.nodes.len() >= MAX_NODES {
            return Err(GraphError::MaxNodesReached(MAX_NODES));
        }
        let mut clone = node.clone();
        clone.id = Node::allocate_id(&mut graph.state.last_node_id);
        clone.pos = [clone.pos[0] + delta[0], clone.pos[1] + delta[1]];
        node_map.insert(node.id, clone.id);
        result.node_ids.push(clone.id);
        graph.nodes.insert(clone.id, clone);
    }

    let mut reroute_map: IndexMap<RerouteId, RerouteId> = IndexMap::new();
    for reroute in definition.graph.reroutes.values() {
        graph.state.last_reroute_id += 1;
        let id = graph.state.last_reroute_id;
        let mut clone = reroute.clone();
        clone.id = id;
        clone.pos = [clone.pos[0] + delta[0], clone.pos[1] + delta[1]];
        clone.link_ids.clear();
        clone.floating_link_ids.clear();
        clone.floating = None;
        reroute_map.insert(reroute.id, id);
        result.reroute_ids.push(id);
        graph.reroutes.insert(id, clone);
    }
    // Parents remap among the clones; boundary splices override below.
    for (&old, &new) in &reroute_map {
        let parent = definition.graph.reroutes[&old]
            .parent_id
            .and_then(|p| reroute_map.get(&p).copied());
        if let Some(reroute) = graph.reroutes.get_mut(&new) {
            reroute.parent_id = parent;
        }
    }

    for group in &definition.graph.groups {
        graph.state.last_group_id += 1;
        let mut clone = group.clone();
        clone.id = graph.state.last_group_id;
        clone.bounding.x += delta[0];
        clone.bounding.y += delta[1];
        result.group_ids.push(clone.id);
        graph.groups.push(clone);
    }

    // Re-create every internal link, splicing boundary links onto the
    // captured external ones.
    for link in definition.graph.links.values() {
        let internal_chain = reroute::chain_to_origin(&definition.graph.reroutes, link.parent_id)
            .ok_or(GraphError::RerouteCycle(link.parent_id.unwrap_or(-1)))?;
        let internal_chain: Vec<RerouteId> = internal_chain
            .iter()
            .map(|id| {
                reroute_map.get(id).copied().ok_or_else(|| {
                    GraphError::BrokenIdLink(format!("unresolvable reroute {id}"))
                })
            })
            .collect::<Result<_, _>>()?;

        let from_input = link.origin_id == NodeId::SUBGRAPH_INPUT;
        let to_output = link.target_id == NodeId::SUBGRAPH_OUTPUT;

        match (from_input, to_output) {
            (false, false) => {
                let origin = remap_node(&node_map, link.origin_id)?;
                let target = remap_node(&node_map, link.target_id)?;
                splice_link(graph, origin, link.origin_slot, target, link.target_slot,
                    &link.data_type, &[], &internal_chain, &[]);
            }
            (true, false) => {
                let Some(external) = inputs_by_port.get(&slot_to_port(link.origin_slot)?) else {
                    tracing::debug!(link = link.id, "unfed boundary input; link dropped");
                    continue;
                };
                let target = remap_node(&node_map, link.target_id)?;
                splice_link(graph, external.link.origin_id, external.link.origin_slot,
                    target, link.target_slot, &link.data_type,
                    &external.chain, &internal_chain, &[]);
            }
            (false, true) => {
                let origin = remap_node(&node_map, link.origin_id)?;
                let Some(externals) = outputs_by_port.get(&slot_to_port(link.target_slot)?) else {
                    tracing::debug!(link = link.id, "unconsumed boundary output; link dropped");
                    continue;
                };
                for external in externals {
                    splice_link(graph, origin, link.origin_slot,
                        external.link.target_id, external.link.target_slot, &link.data_type,
                        &[], &internal_chain, &external.chain);
                }
            }
            (true, true) => {
                // Pass-through: splice external input chain, the internal
                // chain, and each external output chain into one link.
                let Some(external_in) = inputs_by_port.get(&slot_to_port(link.origin_slot)?) else {
                    continue;
                };
                let Some(externals_out) = outputs_by_port.get(&slot_to_port(link.target_slot)?)
                else {
                    continue;
                };
                for external_out in externals_out {
                    splice_link(graph, external_in.link.origin_id, external_in.link.origin_slot,
                        external_out.link.target_id, external_out.link.target_slot,
                        &link.data_type,
                        &external_in.chain, &internal_chain, &external_out.chain);
                }
            }
        }
    }

    // Floating links anchored on a cloned node migrate with it.
    for link in definition.graph.floating_links.values() {
        let mut clone = link.clone();
        let anchored = match clone.floating_anchor() {
            Some(crate::link::FloatingSlotKind::Output) => {
                match node_map.get(&clone.origin_id) {
                    Some(&id) => {
                        clone.origin_id = id;
                        true
                    }
                    None => false,
                }
            }
            Some(crate::link::FloatingSlotKind::Input) => {
                match node_map.get(&clone.target_id) {
                    Some(&id) => {
                        clone.target_id = id;
                        true
                    }
                    None => false,
                }
            }
            None => false,
        };
        if !anchored {
            tracing::debug!(link = link.id, "floating link lost its anchor; dropped");
            continue;
        }
        clone.parent_id = clone.parent_id.and_then(|p| reroute_map.get(&p).copied());
        let _ = graph.add_floating_link(clone);
    }

    graph.rebuild_link_references();
    graph.prune_invalid_reroutes();
    let group_ids = result.group_ids.clone();
    for group_id in group_ids {
        graph.recompute_inside_nodes(group_id);
    }
    graph.compute_execution_order(false);
    graph.mark_dirty();

    Ok(result)
}

/// Create a link with a chain built from up to three spliced segments, each
/// ordered origin-first. The seams are stitched by re-parenting each
/// segment's first reroute onto the previous segment's last.
fn splice_link(
    graph: &mut Graph,
    origin_id: NodeId,
    origin_slot: i32,
    target_id: NodeId,
    target_slot: i32,
    data_type: &str,
    origin_side: &[RerouteId],
    middle: &[RerouteId],
    target_side: &[RerouteId],
) {
    graph.state.last_link_id += 1;
    let id = graph.state.last_link_id;

    let mut chain: Vec<RerouteId> = Vec::new();
    chain.extend_from_slice(origin_side);
    chain.extend_from_slice(middle);
    chain.extend_from_slice(target_side);

    let mut previous: Option<RerouteId> = None;
    for (index, &reroute_id) in chain.iter().enumerate() {
        let at_seam = index == origin_side.len()
            || index == origin_side.len() + middle.len();
        if let Some(reroute) = graph.reroutes.get_mut(&reroute_id) {
            if at_seam || (index == 0 && reroute.parent_id.is_none()) {
                reroute.parent_id = previous;
            }
            reroute.link_ids.insert(id);
        }
        previous = Some(reroute_id);
    }

    let mut link = Link::new(id, origin_id, origin_slot, target_id, target_slot, data_type);
    link.parent_id = chain.last().copied();
    graph.links.insert(id, link);
}

fn remap_node(map: &IndexMap<NodeId, NodeId>, id: NodeId) -> Result<NodeId, GraphError> {
    map.get(&id)
        .copied()
        .ok_or_else(|| GraphError::BrokenIdLink(format!("unresolvable node {id}")))
}

fn slot_to_port(slot: i32) -> Result<usize, GraphError> {
    usize::try_from(slot)
        .map_err(|_| GraphError::BrokenIdLink(format!("negative boundary slot {slot}")))
}

fn capture_chains(graph: &Graph, links: Vec<Link>) -> Result<Vec<BoundaryLink>, GraphError> {
    links
        .into_iter()
        .map(|link| {
            let chain = reroute::chain_to_origin(&graph.reroutes, link.parent_id)
                .ok_or(GraphError::RerouteCycle(link.parent_id.unwrap_or(-1)))?;
            Ok(BoundaryLink { link, chain })
        })
        .collect()
}

fn group_by_endpoint(
    links: &[BoundaryLink],
    key: impl Fn(&Link) -> (NodeId, i32),
) -> IndexMap<(NodeId, i32), Vec<BoundaryLink>> {
    let mut groups: IndexMap<(NodeId, i32), Vec<BoundaryLink>> = IndexMap::new();
    for boundary in links {
        groups
            .entry(key(&boundary.link))
            .or_default()
            .push(boundary.clone());
    }
    groups
}

fn external_output_label(graph: &Graph, id: NodeId, slot: i32) -> Option<(String, String)> {
    let node = graph.nodes.get(&id)?;
    let output = usize::try_from(slot).ok().and_then(|i| node.outputs.get(i))?;
    Some((output.name.clone(), output.data_type.clone()))
}

fn internal_output_label(sub: &Subgraph, id: NodeId, slot: i32) -> Option<(String, String)> {
    let node = sub.graph.nodes.get(&id)?;
    let output = usize::try_from(slot).ok().and_then(|i| node.outputs.get(i))?;
    Some((output.name.clone(), output.data_type.clone()))
}

fn selection_bounds(
    graph: &Graph,
    nodes: &IndexSet<NodeId>,
    reroutes: &IndexSet<RerouteId>,
    groups: &IndexSet<GroupId>,
) -> Option<Rect> {
    let node_rects = nodes
        .iter()
        .filter_map(|id| graph.nodes.get(id))
        .map(Node::bounding_rect);
    let reroute_rects = reroutes
        .iter()
        .filter_map(|id| graph.reroutes.get(id))
        .map(|reroute| Rect::new(reroute.pos[0], reroute.pos[1], 0.0, 0.0));
    let group_rects = graph
        .groups
        .iter()
        .filter(|group| groups.contains(&group.id))
        .map(|group| group.bounding);
    geometry::create_bounds(node_rects.chain(reroute_rects).chain(group_rects), 0.0)
}

fn definition_bounds(graph: &Graph) -> Option<Rect> {
    let node_rects = graph.nodes.values().map(Node::bounding_rect);
    let reroute_rects = graph
        .reroutes
        .values()
        .map(|reroute| Rect::new(reroute.pos[0], reroute.pos[1], 0.0, 0.0));
    let group_rects = graph.groups.iter().map(|group| group.bounding);
    geometry::create_bounds(node_rects.chain(reroute_rects).chain(group_rects), 0.0)
}

fn clear_dangling_parents(graph: &mut Graph) {
    let ids: Vec<RerouteId> = graph.reroutes.keys().copied().collect();
    for id in ids {
        let dangling = graph.reroutes[&id]
            .parent_id
            .is_some_and(|parent| !graph.reroutes.contains_key(&parent));
        if dangling {
            if let Some(reroute) = graph.reroutes.get_mut(&id) {
                reroute.parent_id = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkSegment;
    use crate::node::{InputSlot, OutputSlot};

    fn source(name: &str) -> Node {
        let mut node = Node::new(name, name);
        node.outputs.push(OutputSlot::new("out", "number"));
        node
    }

    fn sink(name: &str) -> Node {
        let mut node = Node::new(name, name);
        node.inputs.push(InputSlot::new("in", "number"));
        node
    }

    fn transform(name: &str) -> Node {
        let mut node = Node::new(name, name);
        node.inputs.push(InputSlot::new("in", "number"));
        node.outputs.push(OutputSlot::new("out", "number"));
        node
    }

    /// External endpoint pairs (origin node/slot, target node/slot) for every
    /// committed link in the graph.
    fn connectivity(graph: &Graph) -> Vec<(NodeId, i32, NodeId, i32)> {
        let mut pairs: Vec<_> = graph
            .links
            .values()
            .map(|l| (l.origin_id, l.origin_slot, l.target_id, l.target_slot))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_empty_selection_is_an_error() {
        let mut graph = Graph::new();
        let result = convert_to_subgraph(&mut graph, &Selection::default());
        assert!(matches!(result, Err(GraphError::EmptySelection)));
    }

    #[test]
    fn test_fan_in_collapses_to_one_port() {
        let mut graph = Graph::new();
        let src = graph.add_node(source("src")).unwrap();
        let a = graph.add_node(sink("a")).unwrap();
        let b = graph.add_node(sink("b")).unwrap();
        let c = graph.add_node(sink("c")).unwrap();
        for id in [a, b, c] {
            graph.connect(src, 0, id, 0, None).unwrap().unwrap();
        }

        let pack = convert_to_subgraph(&mut graph, &Selection::from_nodes([a, b, c])).unwrap();
        let proxy = &graph.nodes[&pack.proxy_node_id];
        assert_eq!(proxy.inputs.len(), 1);
        assert_eq!(proxy.outputs.len(), 0);

        // exactly one parent link: src -> proxy
        assert_eq!(graph.links.len(), 1);
        let link = graph.links.values().next().unwrap();
        assert_eq!(link.origin_id, src);
        assert_eq!(link.target_id, pack.proxy_node_id);

        // inside: the port fans back out to all three sinks
        let sub = &graph.subgraphs[&pack.subgraph_id];
        assert_eq!(sub.inputs.len(), 1);
        let from_boundary: Vec<_> = sub
            .graph
            .links
            .values()
            .filter(|l| l.origin_id == NodeId::SUBGRAPH_INPUT)
            .collect();
        assert_eq!(from_boundary.len(), 3);
    }

    #[test]
    fn test_output_fan_out_shares_one_port() {
        let mut graph = Graph::new();
        let m = graph.add_node(transform("m")).unwrap();
        let a = graph.add_node(sink("a")).unwrap();
        let b = graph.add_node(sink("b")).unwrap();
        graph.connect(m, 0, a, 0, None).unwrap().unwrap();
        graph.connect(m, 0, b, 0, None).unwrap().unwrap();

        let pack = convert_to_subgraph(&mut graph, &Selection::from_nodes([m])).unwrap();
        let proxy = &graph.nodes[&pack.proxy_node_id];
        assert_eq!(proxy.outputs.len(), 1);
        assert_eq!(proxy.outputs[0].links.len(), 2);

        let sub = &graph.subgraphs[&pack.subgraph_id];
        let to_boundary: Vec<_> = sub
            .graph
            .links
            .values()
            .filter(|l| l.target_id == NodeId::SUBGRAPH_OUTPUT)
            .collect();
        assert_eq!(to_boundary.len(), 1);
    }

    #[test]
    fn test_pack_then_unpack_restores_connectivity() {
        let mut graph = Graph::new();
        let src = graph.add_node(source("src")).unwrap();
        let mid = graph.add_node(transform("mid")).unwrap();
        let dst = graph.add_node(sink("dst")).unwrap();
        graph.connect(src, 0, mid, 0, None).unwrap().unwrap();
        graph.connect(mid, 0, dst, 0, None).unwrap().unwrap();

        let pack = convert_to_subgraph(&mut graph, &Selection::from_nodes([mid])).unwrap();
        assert_eq!(graph.nodes.len(), 3); // src, dst, proxy

        let unpack = unpack_subgraph(&mut graph, pack.proxy_node_id).unwrap();
        assert_eq!(unpack.node_ids.len(), 1);
        let new_mid = unpack.node_ids[0];

        let pairs = connectivity(&graph);
        let mut expected = vec![(src, 0, new_mid, 0), (new_mid, 0, dst, 0)];
        expected.sort();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_internal_reroutes_move_and_return() {
        let mut graph = Graph::new();
        let src = graph.add_node(source("src")).unwrap();
        let a = graph.add_node(transform("a")).unwrap();
        let b = graph.add_node(sink("b")).unwrap();
        graph.connect(src, 0, a, 0, None).unwrap().unwrap();
        let inner = graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        let r = graph
            .create_reroute([50.0, 50.0], LinkSegment::Link(inner))
            .unwrap();

        let pack = convert_to_subgraph(&mut graph, &Selection::from_nodes([a, b])).unwrap();
        assert!(!graph.reroutes.contains_key(&r));
        let sub = &graph.subgraphs[&pack.subgraph_id];
        assert_eq!(sub.graph.reroutes.len(), 1);
        let moved = sub.graph.reroutes.values().next().unwrap();
        assert_eq!(moved.link_ids.len(), 1);

        let unpack = unpack_subgraph(&mut graph, pack.proxy_node_id).unwrap();
        assert_eq!(unpack.reroute_ids.len(), 1);
        let back = unpack.reroute_ids[0];
        // the restored internal link runs through the restored reroute
        let internal = graph
            .links
            .values()
            .find(|l| l.parent_id == Some(back))
            .expect("rerouted link restored");
        assert!(graph.reroutes[&back].link_ids.contains(&internal.id));
    }

    #[test]
    fn test_boundary_chain_splits_at_the_seam() {
        let mut graph = Graph::new();
        let src = graph.add_node(source("src")).unwrap();
        let dst = graph.add_node(sink("dst")).unwrap();
        let link = graph.connect(src, 0, dst, 0, None).unwrap().unwrap();
        // external waypoint stays behind when dst is packed
        let r = graph
            .create_reroute([10.0, 0.0], LinkSegment::Link(link))
            .unwrap();

        let pack = convert_to_subgraph(&mut graph, &Selection::from_nodes([dst])).unwrap();
        assert!(graph.reroutes.contains_key(&r));
        let new_link = graph.links.values().next().unwrap();
        assert_eq!(new_link.parent_id, Some(r));
        assert!(graph.reroutes[&r].link_ids.contains(&new_link.id));

        // and is rejoined onto the restored link on unpack
        unpack_subgraph(&mut graph, pack.proxy_node_id).unwrap();
        let restored = graph.links.values().next().unwrap();
        assert_eq!(restored.origin_id, src);
        assert_eq!(restored.parent_id, Some(r));
    }

    #[test]
    fn test_unpack_rejects_ordinary_nodes() {
        let mut graph = Graph::new();
        let a = graph.add_node(source("a")).unwrap();
        let result = unpack_subgraph(&mut graph, a);
        assert!(matches!(result, Err(GraphError::NotASubgraphNode(_))));
    }

    #[test]
    fn test_unpack_unknown_definition() {
        let mut graph = Graph::new();
        let node = Node::new(Uuid::new_v4().to_string(), "ghost");
        let id = graph.add_node(node).unwrap();
        let result = unpack_subgraph(&mut graph, id);
        assert!(matches!(result, Err(GraphError::SubgraphNotFound(_))));
    }

    #[test]
    fn test_proxy_is_centred_on_selection() {
        let mut graph = Graph::new();
        let mut node = transform("m");
        node.pos = [100.0, 100.0];
        node.size = [140.0, 40.0];
        let m = graph.add_node(node).unwrap();

        let pack = convert_to_subgraph(&mut graph, &Selection::from_nodes([m])).unwrap();
        let proxy = &graph.nodes[&pack.proxy_node_id];
        // original bounding rect: (100, 70) to (240, 140); centre (170, 105)
        let centre = proxy.bounding_rect().centre();
        assert!((centre[0] - 170.0).abs() < 1.0);
        // title-bar correction shifts the body down by half a title height
        assert!((proxy.pos[1] + proxy.size[1] * 0.5 - (105.0 + NODE_TITLE_HEIGHT * 0.5)).abs() < 1.0);
    }
}
