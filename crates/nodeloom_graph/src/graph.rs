// SPDX-License-Identifier: MIT OR Apache-2.0
//! The graph aggregate root.
//!
//! Owns every table (nodes, links, floating links, reroutes, groups, subgraph
//! definitions) and exposes all structural mutation. The tables are public for
//! inspection, but mutating them directly bypasses the slot/reroute
//! bookkeeping these operations maintain; treat them as read-only outside this
//! crate's own modules.

use std::collections::VecDeque;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

use crate::error::GraphError;
use crate::execution;
use crate::geometry::Point;
use crate::group::{Group, GroupId};
use crate::link::{FloatingSlotKind, Link, LinkId};
use crate::node::{Node, NodeId};
use crate::registry::NodeRegistry;
use crate::reroute::{self, Reroute, RerouteFloating, RerouteId};
use crate::serialization::{
    GraphState, LinkExtension, LinkRecord, SerialisedDefinitions, SerialisedGraph, LEGACY_VERSION,
};
use crate::settings::MAX_NODES;
use crate::subgraph::Subgraph;

/// Receives synchronous notifications after structural changes.
///
/// A renderer typically implements this to schedule a repaint. Notification is
/// immediate and unbatched; debouncing is the observer's concern.
pub trait GraphObserver {
    /// The graph's structure or layout changed.
    fn mark_dirty(&self, _foreground: bool, _background: bool) {}
    /// The host's node selection changed.
    fn selection_changed(&self, _selected: &[NodeId]) {}
}

/// Handle returned by [`Graph::attach_observer`], used to detach.
pub type ObserverId = u64;

/// Identifies the segment a new reroute is inserted into: the piece of a
/// link's path between `segment` and its parent reroute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSegment {
    /// The stretch between a committed link and its nearest reroute
    Link(LinkId),
    /// The stretch between a floating link and its nearest reroute
    FloatingLink(LinkId),
    /// The stretch between a reroute and its parent
    Reroute(RerouteId),
}

/// A directed graph of typed nodes, links, waypoints, and groups.
pub struct Graph {
    /// Live nodes, keyed by id, in insertion order
    pub nodes: IndexMap<NodeId, Node>,
    /// Committed links
    pub links: IndexMap<LinkId, Link>,
    /// Half-connected links kept for later reconnection
    pub floating_links: IndexMap<LinkId, Link>,
    /// Waypoints
    pub reroutes: IndexMap<RerouteId, Reroute>,
    /// Organizational groups
    pub groups: Vec<Group>,
    /// Nested subgraph definitions, keyed by definition id
    pub subgraphs: IndexMap<Uuid, Subgraph>,
    /// Monotonic id counters
    pub state: GraphState,
    /// Free-form host data persisted under `extra`
    pub extra: serde_json::Map<String, serde_json::Value>,
    observers: Vec<(ObserverId, Box<dyn GraphObserver>)>,
    next_observer_id: ObserverId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes)
            .field("links", &self.links)
            .field("floating_links", &self.floating_links)
            .field("reroutes", &self.reroutes)
            .field("groups", &self.groups)
            .field("subgraphs", &self.subgraphs)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Clone for Graph {
    /// Clones every table. Observers stay with the original.
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            links: self.links.clone(),
            floating_links: self.floating_links.clone(),
            reroutes: self.reroutes.clone(),
            groups: self.groups.clone(),
            subgraphs: self.subgraphs.clone(),
            state: self.state,
            extra: self.extra.clone(),
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            floating_links: IndexMap::new(),
            reroutes: IndexMap::new(),
            groups: Vec::new(),
            subgraphs: IndexMap::new(),
            state: GraphState::default(),
            extra: serde_json::Map::new(),
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    /// Remove every element and reset the id counters. Observers stay
    /// attached.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.floating_links.clear();
        self.reroutes.clear();
        self.groups.clear();
        self.subgraphs.clear();
        self.state = GraphState::default();
        self.extra.clear();
        self.mark_dirty();
    }

    // ----- observers -------------------------------------------------------

    /// Attach an observer; returns the handle needed to detach it.
    pub fn attach_observer(&mut self, observer: Box<dyn GraphObserver>) -> ObserverId {
        self.next_observer_id += 1;
        let id = self.next_observer_id;
        self.observers.push((id, observer));
        id
    }

    /// Detach an observer. `false` when the handle is unknown.
    pub fn detach_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Tell the host's selection listeners what is selected now.
    pub fn notify_selection_changed(&self, selected: &[NodeId]) {
        for (_, observer) in &self.observers {
            observer.selection_changed(selected);
        }
    }

    pub(crate) fn mark_dirty(&self) {
        for (_, observer) in &self.observers {
            observer.mark_dirty(true, true);
        }
    }

    // ----- nodes -----------------------------------------------------------

    /// Look up a node by id.
    pub fn get_node_by_id(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Look up a node by id, mutably.
    pub fn get_node_by_id_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Add a node and recompute the execution order.
    ///
    /// A node arriving without an id (or with an id already in use) gets a
    /// fresh one. Fails when the graph is at [`MAX_NODES`].
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        self.add_node_inner(node, true)
    }

    /// [`Graph::add_node`] without the execution-order recomputation, for
    /// bulk-load paths that recompute once at the end.
    pub fn add_node_deferred(&mut self, node: Node) -> Result<NodeId, GraphError> {
        self.add_node_inner(node, false)
    }

    fn add_node_inner(&mut self, mut node: Node, compute_order: bool) -> Result<NodeId, GraphError> {
        if self.nodes.len() >= MAX_NODES {
            return Err(GraphError::MaxNodesReached(MAX_NODES));
        }

        if node.id == NodeId::NONE {
            node.id = Node::allocate_id(&mut self.state.last_node_id);
        } else if self.nodes.contains_key(&node.id) {
            let previous = node.id;
            node.id = Node::allocate_id(&mut self.state.last_node_id);
            tracing::warn!(%previous, reassigned = %node.id, "node id already in use");
        } else if let NodeId::Number(n) = node.id {
            self.state.last_node_id = self.state.last_node_id.max(n);
        }

        let id = node.id;
        self.nodes.insert(id, node);
        if compute_order {
            self.compute_execution_order(false);
        }
        self.mark_dirty();
        Ok(id)
    }

    /// Remove a node, severing every link and floating link that touches it.
    ///
    /// Removing an unknown, pinned, or non-removable node is a logged no-op.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            tracing::warn!(node = %id, "cannot remove: no such node");
            return false;
        };
        if !node.removable || node.flags.pinned {
            tracing::warn!(node = %id, "cannot remove: node is protected");
            return false;
        }

        for slot in 0..node.inputs.len() {
            self.disconnect_input(id, slot);
        }
        let node = &self.nodes[&id];
        let outgoing: Vec<LinkId> = node
            .outputs
            .iter()
            .flat_map(|slot| slot.links.iter().copied())
            .collect();
        for link_id in outgoing {
            self.remove_link(link_id);
        }

        let floating: Vec<LinkId> = self
            .floating_links
            .values()
            .filter(|link| link.origin_id == id || link.target_id == id)
            .map(|link| link.id)
            .collect();
        for link_id in floating {
            self.remove_floating_link(link_id);
        }

        self.nodes.shift_remove(&id);
        self.compute_execution_order(false);
        self.mark_dirty();
        true
    }

    // ----- links -----------------------------------------------------------

    /// Connect an output slot to an input slot.
    ///
    /// Severs any link already feeding the target input. When
    /// `after_reroute_id` is given the new link is threaded through that
    /// reroute's chain: every chain reroute gains the link and loses its
    /// floating state, and floating links previously hanging off the chain
    /// are deleted.
    ///
    /// Returns `Ok(None)` for rejected requests (unknown endpoints, bad slot
    /// indices, self-loops), which are warnings rather than errors.
    pub fn connect(
        &mut self,
        origin_id: NodeId,
        origin_slot: usize,
        target_id: NodeId,
        target_slot: usize,
        after_reroute_id: Option<RerouteId>,
    ) -> Result<Option<LinkId>, GraphError> {
        if origin_id == target_id {
            tracing::warn!(node = %origin_id, "rejecting self-loop connection");
            return Ok(None);
        }
        let Some(origin) = self.nodes.get(&origin_id) else {
            tracing::warn!(node = %origin_id, "cannot connect: no such origin node");
            return Ok(None);
        };
        let Some(output) = origin.outputs.get(origin_slot) else {
            tracing::warn!(node = %origin_id, slot = origin_slot, "cannot connect: no such output");
            return Ok(None);
        };
        let data_type = output.data_type.clone();
        let Some(target) = self.nodes.get(&target_id) else {
            tracing::warn!(node = %target_id, "cannot connect: no such target node");
            return Ok(None);
        };
        let Some(input) = target.inputs.get(target_slot) else {
            tracing::warn!(node = %target_id, slot = target_slot, "cannot connect: no such input");
            return Ok(None);
        };

        if let Some(existing) = input.link {
            self.remove_link(existing);
        }

        let chain = match after_reroute_id {
            Some(reroute_id) if self.reroutes.contains_key(&reroute_id) => {
                match reroute::chain_to_origin(&self.reroutes, Some(reroute_id)) {
                    Some(chain) => chain,
                    None => return Err(GraphError::RerouteCycle(reroute_id)),
                }
            }
            Some(reroute_id) => {
                tracing::warn!(reroute = reroute_id, "unknown reroute; connecting directly");
                Vec::new()
            }
            None => Vec::new(),
        };

        self.state.last_link_id += 1;
        let id = self.state.last_link_id;
        let mut link = Link::new(
            id,
            origin_id,
            origin_slot as i32,
            target_id,
            target_slot as i32,
            data_type,
        );
        if !chain.is_empty() {
            link.parent_id = after_reroute_id;
        }

        // Every reroute on the chain lists the same floating links; dedupe so
        // each is removed exactly once.
        let mut stale_floating: IndexSet<LinkId> = IndexSet::new();
        for reroute_id in &chain {
            if let Some(reroute) = self.reroutes.get_mut(reroute_id) {
                reroute.link_ids.insert(id);
                stale_floating.extend(reroute.floating_link_ids.iter().copied());
                reroute.floating = None;
            }
        }
        for link_id in stale_floating {
            self.remove_floating_link(link_id);
        }

        if let Some(node) = self.nodes.get_mut(&origin_id) {
            if let Some(slot) = node.outputs.get_mut(origin_slot) {
                slot.links.push(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&target_id) {
            if let Some(slot) = node.inputs.get_mut(target_slot) {
                slot.link = Some(id);
            }
        }

        self.links.insert(id, link);
        self.compute_execution_order(false);
        self.mark_dirty();
        Ok(Some(id))
    }

    /// Sever the link feeding an input slot, if any.
    pub fn disconnect_input(&mut self, node_id: NodeId, slot: usize) -> bool {
        let Some(node) = self.nodes.get(&node_id) else {
            tracing::warn!(node = %node_id, "cannot disconnect: no such node");
            return false;
        };
        let Some(link_id) = node.inputs.get(slot).and_then(|input| input.link) else {
            return false;
        };
        self.remove_link(link_id)
    }

    /// Sever every link fanning out of an output slot.
    pub fn disconnect_output(&mut self, node_id: NodeId, slot: usize) -> bool {
        let Some(node) = self.nodes.get(&node_id) else {
            tracing::warn!(node = %node_id, "cannot disconnect: no such node");
            return false;
        };
        let links: Vec<LinkId> = node
            .outputs
            .get(slot)
            .map(|output| output.links.clone())
            .unwrap_or_default();
        let mut removed = false;
        for link_id in links {
            removed |= self.remove_link(link_id);
        }
        removed
    }

    /// Remove a committed link, updating both endpoint slots and pruning any
    /// reroute the removal leaves without links.
    pub fn remove_link(&mut self, link_id: LinkId) -> bool {
        let Some(link) = self.links.shift_remove(&link_id) else {
            tracing::warn!(link = link_id, "cannot remove: no such link");
            return false;
        };

        if let Some(node) = self.nodes.get_mut(&link.origin_id) {
            if let Some(slot) = slot_index(link.origin_slot).and_then(|i| node.outputs.get_mut(i)) {
                slot.links.retain(|&l| l != link_id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&link.target_id) {
            if let Some(slot) = slot_index(link.target_slot).and_then(|i| node.inputs.get_mut(i)) {
                if slot.link == Some(link_id) {
                    slot.link = None;
                }
            }
        }

        let mut garbage: Vec<RerouteId> = Vec::new();
        for (&reroute_id, reroute) in &mut self.reroutes {
            reroute.remove_link(link_id);
            if reroute.is_garbage() {
                garbage.push(reroute_id);
            }
        }
        for reroute_id in garbage {
            self.reroutes.shift_remove(&reroute_id);
        }

        self.compute_execution_order(false);
        self.mark_dirty();
        true
    }

    // ----- floating links --------------------------------------------------

    /// Register a half-connected link.
    ///
    /// Exactly one endpoint must be absent; the link gets a fresh id. The
    /// anchored slot and any reroutes on `parent_id`'s chain take a reference
    /// to it, and the chain tip is marked as the floating terminus.
    pub fn add_floating_link(&mut self, mut link: Link) -> Option<LinkId> {
        let Some(anchor) = link.floating_anchor() else {
            tracing::warn!(link = link.id, "not a floating link; both endpoints set");
            return None;
        };

        self.state.last_link_id += 1;
        link.id = self.state.last_link_id;
        let id = link.id;

        match anchor {
            FloatingSlotKind::Output => {
                if let Some(node) = self.nodes.get_mut(&link.origin_id) {
                    if let Some(slot) =
                        slot_index(link.origin_slot).and_then(|i| node.outputs.get_mut(i))
                    {
                        slot.floating_link_ids.insert(id);
                    }
                }
            }
            FloatingSlotKind::Input => {
                if let Some(node) = self.nodes.get_mut(&link.target_id) {
                    if let Some(slot) =
                        slot_index(link.target_slot).and_then(|i| node.inputs.get_mut(i))
                    {
                        slot.floating_link_ids.insert(id);
                    }
                }
            }
        }

        match reroute::chain_to_origin(&self.reroutes, link.parent_id) {
            Some(chain) => {
                for reroute_id in chain {
                    if let Some(reroute) = self.reroutes.get_mut(&reroute_id) {
                        reroute.floating_link_ids.insert(id);
                    }
                }
                if let Some(tip) = link.parent_id.and_then(|p| self.reroutes.get_mut(&p)) {
                    tip.floating = Some(RerouteFloating { slot_type: anchor });
                }
            }
            None => {
                tracing::warn!(link = id, "cyclic reroute chain; floating link detached from it");
                link.parent_id = None;
            }
        }

        self.floating_links.insert(id, link);
        self.mark_dirty();
        Some(id)
    }

    /// Remove a floating link, releasing its slot and reroute references.
    /// Reroutes left without any link are deleted.
    pub fn remove_floating_link(&mut self, link_id: LinkId) -> bool {
        let Some(link) = self.floating_links.shift_remove(&link_id) else {
            tracing::warn!(link = link_id, "cannot remove: no such floating link");
            return false;
        };

        if let Some(node) = self.nodes.get_mut(&link.origin_id) {
            if let Some(slot) = slot_index(link.origin_slot).and_then(|i| node.outputs.get_mut(i)) {
                slot.floating_link_ids.remove(&link_id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&link.target_id) {
            if let Some(slot) = slot_index(link.target_slot).and_then(|i| node.inputs.get_mut(i)) {
                slot.floating_link_ids.remove(&link_id);
            }
        }

        let mut garbage: Vec<RerouteId> = Vec::new();
        for (&reroute_id, reroute) in &mut self.reroutes {
            reroute.remove_link(link_id);
            if reroute.is_garbage() {
                garbage.push(reroute_id);
            }
        }
        for reroute_id in garbage {
            self.reroutes.shift_remove(&reroute_id);
        }

        self.mark_dirty();
        true
    }

    // ----- reroutes --------------------------------------------------------

    /// Look up a reroute by id.
    pub fn get_reroute(&self, id: RerouteId) -> Option<&Reroute> {
        self.reroutes.get(&id)
    }

    /// The reroute chain of a committed or floating link, ordered from the
    /// origin outward. `None` when the link is unknown or its chain loops.
    pub fn reroutes_for_link(&self, link_id: LinkId) -> Option<Vec<RerouteId>> {
        let link = self
            .links
            .get(&link_id)
            .or_else(|| self.floating_links.get(&link_id))?;
        reroute::chain_to_origin(&self.reroutes, link.parent_id)
    }

    /// Insert a new reroute into the middle of a link segment.
    ///
    /// The reroute takes over the segment's links; everything that pointed at
    /// the segment's parent across those links now points at the new reroute.
    pub fn create_reroute(&mut self, pos: Point, before: LinkSegment) -> Option<RerouteId> {
        let (parent_id, link_ids, floating_link_ids) = match before {
            LinkSegment::Link(link_id) => {
                let Some(link) = self.links.get(&link_id) else {
                    tracing::warn!(link = link_id, "cannot create reroute: no such link");
                    return None;
                };
                (link.parent_id, vec![link_id], Vec::new())
            }
            LinkSegment::FloatingLink(link_id) => {
                let Some(link) = self.floating_links.get(&link_id) else {
                    tracing::warn!(link = link_id, "cannot create reroute: no such floating link");
                    return None;
                };
                (link.parent_id, Vec::new(), vec![link_id])
            }
            LinkSegment::Reroute(reroute_id) => {
                let Some(reroute) = self.reroutes.get(&reroute_id) else {
                    tracing::warn!(reroute = reroute_id, "cannot create reroute: no such reroute");
                    return None;
                };
                (
                    reroute.parent_id,
                    reroute.link_ids.iter().copied().collect(),
                    reroute.floating_link_ids.iter().copied().collect(),
                )
            }
        };

        self.state.last_reroute_id += 1;
        let id = self.state.last_reroute_id;
        let mut created = Reroute::new(id, pos, parent_id, link_ids.iter().copied());
        created.floating_link_ids = floating_link_ids.iter().copied().collect();

        match before {
            LinkSegment::Link(link_id) => {
                if let Some(link) = self.links.get_mut(&link_id) {
                    if link.parent_id == parent_id {
                        link.parent_id = Some(id);
                    }
                }
                self.reparent_chain_on_links(&link_ids, parent_id, id);
            }
            LinkSegment::FloatingLink(link_id) => {
                if let Some(link) = self.floating_links.get_mut(&link_id) {
                    if link.parent_id == parent_id {
                        link.parent_id = Some(id);
                    }
                    // The new reroute is now the floating terminus.
                    created.floating = Some(RerouteFloating {
                        slot_type: link.floating_anchor().unwrap_or(FloatingSlotKind::Output),
                    });
                }
                if let Some(old_tip) = parent_id.and_then(|p| self.reroutes.get_mut(&p)) {
                    old_tip.floating = None;
                }
            }
            LinkSegment::Reroute(reroute_id) => {
                if let Some(reroute) = self.reroutes.get_mut(&reroute_id) {
                    reroute.parent_id = Some(id);
                }
            }
        }

        self.reroutes.insert(id, created);
        self.mark_dirty();
        Some(id)
    }

    /// Point other reroutes riding `link_ids` past the insertion point at the
    /// freshly created reroute.
    fn reparent_chain_on_links(
        &mut self,
        link_ids: &[LinkId],
        old_parent: Option<RerouteId>,
        new_parent: RerouteId,
    ) {
        let affected: Vec<RerouteId> = self
            .reroutes
            .iter()
            .filter(|(&id, reroute)| {
                id != new_parent
                    && reroute.parent_id == old_parent
                    && link_ids.iter().any(|l| reroute.link_ids.contains(l))
            })
            .map(|(&id, _)| id)
            .collect();
        for id in affected {
            if let Some(reroute) = self.reroutes.get_mut(&id) {
                reroute.parent_id = Some(new_parent);
            }
        }
    }

    /// Remove a reroute, splicing its chain.
    ///
    /// Children (reroutes and links pointing at it) inherit its parent.
    /// Floating links through it are deleted, except when the removed reroute
    /// was the floating terminus and its parent carries only that floating
    /// link, in which case the terminus marker migrates to the parent.
    pub fn remove_reroute(&mut self, id: RerouteId) -> bool {
        let Some(removed) = self.reroutes.shift_remove(&id) else {
            tracing::warn!(reroute = id, "cannot remove: no such reroute");
            return false;
        };
        let parent = removed.parent_id;

        for reroute in self.reroutes.values_mut() {
            if reroute.parent_id == Some(id) {
                reroute.parent_id = parent;
            }
        }
        for link_id in &removed.link_ids {
            if let Some(link) = self.links.get_mut(link_id) {
                if link.parent_id == Some(id) {
                    link.parent_id = parent;
                }
            }
        }

        for link_id in removed.floating_link_ids.iter().copied().collect::<Vec<_>>() {
            let migrate = removed.floating.is_some()
                && parent
                    .and_then(|p| self.reroutes.get(&p))
                    .is_some_and(|p| p.link_ids.is_empty() && p.floating_link_ids.contains(&link_id));
            if migrate {
                if let Some(new_tip) = parent.and_then(|p| self.reroutes.get_mut(&p)) {
                    new_tip.floating = removed.floating;
                }
                if let Some(link) = self.floating_links.get_mut(&link_id) {
                    if link.parent_id == Some(id) {
                        link.parent_id = parent;
                    }
                }
            } else {
                self.remove_floating_link(link_id);
            }
        }

        self.mark_dirty();
        true
    }

    // ----- groups ----------------------------------------------------------

    /// Add a group, assigning an id when needed, and compute its children.
    pub fn add_group(&mut self, mut group: Group) -> GroupId {
        if group.id <= 0 || self.groups.iter().any(|g| g.id == group.id) {
            self.state.last_group_id += 1;
            group.id = self.state.last_group_id;
        } else {
            self.state.last_group_id = self.state.last_group_id.max(group.id);
        }
        let id = group.id;
        self.groups.push(group);
        self.recompute_inside_nodes(id);
        self.mark_dirty();
        id
    }

    /// Detach a group. Its contents stay in the graph.
    pub fn remove_group(&mut self, id: GroupId) -> bool {
        let before = self.groups.len();
        self.groups.retain(|group| group.id != id);
        if self.groups.len() == before {
            tracing::warn!(group = id, "cannot remove: no such group");
            return false;
        }
        self.mark_dirty();
        true
    }

    /// Look up a group by id.
    pub fn get_group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    /// Recompute a group's derived child set from geometry.
    ///
    /// Children are nodes whose centre lies inside the rectangle, reroutes
    /// whose point lies inside, and groups wholly contained. Also reorders the
    /// group list so containers precede the groups they contain.
    pub fn recompute_inside_nodes(&mut self, id: GroupId) {
        let Some(index) = self.groups.iter().position(|group| group.id == id) else {
            tracing::warn!(group = id, "cannot recompute children: no such group");
            return;
        };
        let bounding = self.groups[index].bounding;

        let child_nodes: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| bounding.contains_centre(&node.bounding_rect()))
            .map(|(&node_id, _)| node_id)
            .collect();
        let child_reroutes: Vec<RerouteId> = self
            .reroutes
            .iter()
            .filter(|(_, reroute)| bounding.contains_point(reroute.pos))
            .map(|(&reroute_id, _)| reroute_id)
            .collect();
        let child_groups: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|group| group.id != id && bounding.contains_rect(&group.bounding))
            .map(|group| group.id)
            .collect();

        let group = &mut self.groups[index];
        group.child_nodes = child_nodes;
        group.child_reroutes = child_reroutes;
        group.child_groups = child_groups;

        // Containers first: larger groups are drawn and hit-tested before the
        // groups nested inside them.
        self.groups.sort_by(|a, b| {
            let area_a = a.bounding.width * a.bounding.height;
            let area_b = b.bounding.width * b.bounding.height;
            area_b.partial_cmp(&area_a).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Move a group and everything inside it. No-op for pinned groups.
    pub fn move_group(&mut self, id: GroupId, delta_x: f32, delta_y: f32) -> bool {
        self.recompute_inside_nodes(id);
        let Some(group) = self.groups.iter_mut().find(|group| group.id == id) else {
            return false;
        };
        if !group.move_by(delta_x, delta_y) {
            return false;
        }
        let child_nodes = group.child_nodes.clone();
        let child_reroutes = group.child_reroutes.clone();

        for node_id in child_nodes {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.move_by(delta_x, delta_y);
            }
        }
        for reroute_id in child_reroutes {
            if let Some(reroute) = self.reroutes.get_mut(&reroute_id) {
                reroute.pos[0] += delta_x;
                reroute.pos[1] += delta_y;
            }
        }
        self.mark_dirty();
        true
    }

    // ----- execution order -------------------------------------------------

    /// Compute the node evaluation sequence: a Kahn topological sort over the
    /// link table, stably reordered by node priority with the topological
    /// index as the tie-break. Writes each node's `order` and, when requested,
    /// its `level`.
    pub fn compute_execution_order(&mut self, compute_levels: bool) -> Vec<NodeId> {
        execution::compute_execution_order(self, compute_levels)
    }

    // ----- serialization ---------------------------------------------------

    /// Rebuild this graph from a persisted record.
    ///
    /// Tolerant of partially invalid data: unknown node types become inert
    /// placeholders, links with unresolvable endpoints are dropped, orphaned
    /// reroutes are pruned, and cyclic reroute parents are cleared. Each case
    /// logs a warning; none aborts the load.
    pub fn configure(&mut self, record: &SerialisedGraph, registry: &NodeRegistry) {
        self.configure_merge(record, registry, false)
    }

    /// [`Graph::configure`] with an option to keep the existing contents and
    /// merge the record on top.
    pub fn configure_merge(
        &mut self,
        record: &SerialisedGraph,
        registry: &NodeRegistry,
        keep_existing: bool,
    ) {
        if !keep_existing {
            self.clear();
        }

        let state = record.resolved_state();
        self.state.last_node_id = self.state.last_node_id.max(state.last_node_id);
        self.state.last_link_id = self.state.last_link_id.max(state.last_link_id);
        self.state.last_group_id = self.state.last_group_id.max(state.last_group_id);
        self.state.last_reroute_id = self.state.last_reroute_id.max(state.last_reroute_id);

        let mut extra = record.extra.clone();
        if record.is_legacy() {
            // Representation side-channels, not host data.
            extra.remove("linkExtensions");
            extra.remove("reroutes");
        }
        self.extra.extend(extra);

        if let Some(definitions) = &record.definitions {
            for sub_record in &definitions.subgraphs {
                let subgraph = Subgraph::from_record(sub_record, registry);
                self.subgraphs.insert(subgraph.id, subgraph);
            }
        }

        let (links, reroutes) = record.resolve_links_and_reroutes();

        // Reroutes first; node configuration resolves chains through them.
        for reroute in reroutes {
            self.state.last_reroute_id = self.state.last_reroute_id.max(reroute.id);
            self.reroutes.insert(reroute.id, reroute);
        }
        let reroute_ids: Vec<RerouteId> = self.reroutes.keys().copied().collect();
        for reroute_id in reroute_ids {
            if reroute::chain_to_origin(&self.reroutes, Some(reroute_id)).is_none() {
                tracing::warn!(reroute = reroute_id, "cyclic reroute parent cleared on load");
                if let Some(reroute) = self.reroutes.get_mut(&reroute_id) {
                    reroute.parent_id = None;
                }
            }
        }

        for (id, link) in links {
            self.state.last_link_id = self.state.last_link_id.max(id);
            self.links.insert(id, link);
        }

        for node_record in &record.nodes {
            if self.nodes.len() >= MAX_NODES {
                tracing::warn!("node limit reached during load; remaining nodes dropped");
                break;
            }
            let mut node = match Uuid::parse_str(&node_record.type_name) {
                Ok(subgraph_id) => match self.subgraphs.get(&subgraph_id) {
                    Some(definition) => definition.create_proxy_node(),
                    None => {
                        tracing::warn!(%subgraph_id, "missing subgraph definition; placeholder");
                        NodeRegistry::create_placeholder(node_record)
                    }
                },
                Err(_) => match registry.create(&node_record.type_name) {
                    Some(node) => node,
                    None => {
                        tracing::warn!(
                            type_name = %node_record.type_name,
                            "unknown node type; placeholder"
                        );
                        NodeRegistry::create_placeholder(node_record)
                    }
                },
            };
            node.configure(node_record);
            if let NodeId::Number(n) = node.id {
                self.state.last_node_id = self.state.last_node_id.max(n);
            }
            self.nodes.insert(node.id, node);
        }

        for group in &record.groups {
            let mut group = group.clone();
            if group.id <= 0 {
                self.state.last_group_id += 1;
                group.id = self.state.last_group_id;
            } else {
                self.state.last_group_id = self.state.last_group_id.max(group.id);
            }
            self.groups.push(group);
        }

        for link in record.floating_links.iter().flatten() {
            if !link.is_floating() {
                tracing::warn!(link = link.id, "record lists a committed link as floating");
                continue;
            }
            self.state.last_link_id = self.state.last_link_id.max(link.id);
            self.floating_links.insert(link.id, link.clone());
        }

        self.rebuild_link_references();
        self.prune_invalid_reroutes();

        let group_ids: Vec<GroupId> = self.groups.iter().map(|group| group.id).collect();
        for group_id in group_ids {
            self.recompute_inside_nodes(group_id);
        }

        self.compute_execution_order(false);
        self.mark_dirty();
    }

    /// Project the graph into the current-schema record.
    ///
    /// Subgraph definitions are pruned to the ids actually referenced by a
    /// proxy node somewhere in the tree; unreferenced definitions are not
    /// written (they are never pruned on read).
    pub fn as_serialisable(&self) -> SerialisedGraph {
        let links: Vec<LinkRecord> = self
            .links
            .values()
            .cloned()
            .map(LinkRecord::Object)
            .collect();
        let floating_links: Vec<Link> = self.floating_links.values().cloned().collect();
        let reroutes: Vec<Reroute> = self.reroutes.values().cloned().collect();

        let used = self.find_used_subgraph_ids();
        let subgraphs: Vec<_> = self
            .subgraphs
            .values()
            .filter(|subgraph| used.contains(&subgraph.id))
            .map(Subgraph::as_serialisable)
            .collect();

        SerialisedGraph {
            version: None,
            state: self.state,
            last_node_id: None,
            last_link_id: None,
            nodes: self.nodes.values().map(Node::as_serialisable).collect(),
            links: (!links.is_empty()).then_some(links),
            floating_links: (!floating_links.is_empty()).then_some(floating_links),
            groups: self.groups.clone(),
            reroutes: (!reroutes.is_empty()).then_some(reroutes),
            definitions: (!subgraphs.is_empty())
                .then_some(SerialisedDefinitions { subgraphs }),
            extra: self.extra.clone(),
        }
    }

    /// Project the graph into the legacy `version: 0.4` record: tuple links,
    /// reroute parents under `extra.linkExtensions`, reroutes under
    /// `extra.reroutes`.
    pub fn serialize_legacy(&self) -> SerialisedGraph {
        let links: Vec<LinkRecord> = self
            .links
            .values()
            .map(|link| LinkRecord::Tuple(link.into()))
            .collect();

        let mut extra = self.extra.clone();
        let extensions: Vec<LinkExtension> = self
            .links
            .values()
            .filter(|link| link.parent_id.is_some())
            .map(|link| LinkExtension {
                id: link.id,
                parent_id: link.parent_id,
            })
            .collect();
        if !extensions.is_empty() {
            match serde_json::to_value(&extensions) {
                Ok(value) => {
                    extra.insert("linkExtensions".into(), value);
                }
                Err(error) => tracing::warn!(%error, "failed to encode link extensions"),
            }
        }
        if !self.reroutes.is_empty() {
            let reroutes: Vec<&Reroute> = self.reroutes.values().collect();
            match serde_json::to_value(&reroutes) {
                Ok(value) => {
                    extra.insert("reroutes".into(), value);
                }
                Err(error) => tracing::warn!(%error, "failed to encode reroutes"),
            }
        }

        SerialisedGraph {
            version: Some(LEGACY_VERSION),
            state: self.state,
            last_node_id: Some(self.state.last_node_id),
            last_link_id: Some(self.state.last_link_id),
            nodes: self.nodes.values().map(Node::as_serialisable).collect(),
            links: (!links.is_empty()).then_some(links),
            floating_links: None,
            groups: self.groups.clone(),
            reroutes: None,
            definitions: None,
            extra,
        }
    }

    /// Subgraph ids referenced by a proxy node in this graph or in any
    /// referenced definition's graph.
    pub fn find_used_subgraph_ids(&self) -> IndexSet<Uuid> {
        let mut used: IndexSet<Uuid> = IndexSet::new();
        let mut queue: VecDeque<Uuid> =
            self.nodes.values().filter_map(Node::subgraph_id).collect();
        while let Some(id) = queue.pop_front() {
            if !used.insert(id) {
                continue;
            }
            if let Some(definition) = self.subgraphs.get(&id) {
                queue.extend(definition.graph.nodes.values().filter_map(Node::subgraph_id));
            }
        }
        used
    }

    /// Drop slot references from all nodes and rebuild them from the link
    /// tables, discarding links whose endpoints no longer resolve.
    pub(crate) fn rebuild_link_references(&mut self) {
        for node in self.nodes.values_mut() {
            for input in &mut node.inputs {
                input.link = None;
                input.floating_link_ids.clear();
            }
            for output in &mut node.outputs {
                output.links.clear();
                output.floating_link_ids.clear();
            }
        }

        let link_ids: Vec<LinkId> = self.links.keys().copied().collect();
        for link_id in link_ids {
            let (origin_id, origin_slot, target_id, target_slot) = {
                let link = &self.links[&link_id];
                (
                    link.origin_id,
                    link.origin_slot,
                    link.target_id,
                    link.target_slot,
                )
            };
            let resolved = self.slot_resolves(origin_id, origin_slot, FloatingSlotKind::Output)
                && self.slot_resolves(target_id, target_slot, FloatingSlotKind::Input);
            if !resolved {
                tracing::warn!(link = link_id, "dropping link with unresolvable endpoint");
                self.links.shift_remove(&link_id);
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&origin_id) {
                if let Some(slot) = slot_index(origin_slot).and_then(|i| node.outputs.get_mut(i)) {
                    slot.links.push(link_id);
                }
            }
            if let Some(node) = self.nodes.get_mut(&target_id) {
                if let Some(slot) = slot_index(target_slot).and_then(|i| node.inputs.get_mut(i)) {
                    slot.link = Some(link_id);
                }
            }
        }

        let floating_ids: Vec<LinkId> = self.floating_links.keys().copied().collect();
        for link_id in floating_ids {
            let link = self.floating_links[&link_id].clone();
            let Some(anchor) = link.floating_anchor() else {
                self.floating_links.shift_remove(&link_id);
                continue;
            };
            let resolved = match anchor {
                FloatingSlotKind::Output => {
                    self.slot_resolves(link.origin_id, link.origin_slot, FloatingSlotKind::Output)
                }
                FloatingSlotKind::Input => {
                    self.slot_resolves(link.target_id, link.target_slot, FloatingSlotKind::Input)
                }
            };
            if !resolved {
                tracing::warn!(link = link_id, "dropping floating link with unresolvable anchor");
                self.floating_links.shift_remove(&link_id);
                continue;
            }
            match anchor {
                FloatingSlotKind::Output => {
                    if let Some(node) = self.nodes.get_mut(&link.origin_id) {
                        if let Some(slot) =
                            slot_index(link.origin_slot).and_then(|i| node.outputs.get_mut(i))
                        {
                            slot.floating_link_ids.insert(link_id);
                        }
                    }
                }
                FloatingSlotKind::Input => {
                    if let Some(node) = self.nodes.get_mut(&link.target_id) {
                        if let Some(slot) =
                            slot_index(link.target_slot).and_then(|i| node.inputs.get_mut(i))
                        {
                            slot.floating_link_ids.insert(link_id);
                        }
                    }
                }
            }
            if let Some(chain) = reroute::chain_to_origin(&self.reroutes, link.parent_id) {
                for reroute_id in chain {
                    if let Some(reroute) = self.reroutes.get_mut(&reroute_id) {
                        reroute.floating_link_ids.insert(link_id);
                    }
                }
                if let Some(tip) = link.parent_id.and_then(|p| self.reroutes.get_mut(&p)) {
                    tip.floating = Some(RerouteFloating { slot_type: anchor });
                }
            }
        }
    }

    /// A slot reference resolves when the node is live and the index is in
    /// range. Subgraph boundary ids always resolve; their pseudo-slots live on
    /// the definition, not in the node table.
    fn slot_resolves(&self, id: NodeId, slot: i32, side: FloatingSlotKind) -> bool {
        if id == NodeId::SUBGRAPH_INPUT || id == NodeId::SUBGRAPH_OUTPUT {
            return true;
        }
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let Some(index) = slot_index(slot) else {
            return false;
        };
        match side {
            FloatingSlotKind::Output => index < node.outputs.len(),
            FloatingSlotKind::Input => index < node.inputs.len(),
        }
    }

    /// Drop link references that no longer validate, then prune reroutes left
    /// without any link.
    pub(crate) fn prune_invalid_reroutes(&mut self) {
        let mut garbage: Vec<RerouteId> = Vec::new();
        for (&reroute_id, reroute) in &mut self.reroutes {
            let links = &self.links;
            reroute.link_ids.retain(|id| links.contains_key(id));
            let floating = &self.floating_links;
            reroute.floating_link_ids.retain(|id| floating.contains_key(id));
            if reroute.floating_link_ids.is_empty() {
                reroute.floating = None;
            }
            if reroute.is_garbage() {
                garbage.push(reroute_id);
            }
        }
        for reroute_id in garbage {
            tracing::warn!(reroute = reroute_id, "pruning orphaned reroute");
            self.reroutes.shift_remove(&reroute_id);
        }
    }
}

fn slot_index(slot: i32) -> Option<usize> {
    usize::try_from(slot).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::node::{InputSlot, OutputSlot};
    use crate::registry::NodeTypeDef;
    use std::cell::Cell;
    use std::rc::Rc;

    fn simple_node(name: &str) -> Node {
        let mut node = Node::new(name, name);
        node.inputs.push(InputSlot::new("in", "number"));
        node.outputs.push(OutputSlot::new("out", "number"));
        node
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register(
            NodeTypeDef::new("test/simple", "Simple")
                .with_input("in", "number")
                .with_output("out", "number"),
        );
        registry
    }

    fn registered_node(graph: &mut Graph, registry: &NodeRegistry) -> NodeId {
        let node = registry.create("test/simple").unwrap();
        graph.add_node(node).unwrap()
    }

    #[test]
    fn test_add_assigns_unique_ids() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let mut duplicate = simple_node("b");
        duplicate.id = a;
        let b = graph.add_node(duplicate).unwrap();
        assert_ne!(a, b);
        assert_eq!(graph.nodes.len(), 2);

        // removing frees the id for reuse
        assert!(graph.remove_node(a));
        let mut reuse = simple_node("c");
        reuse.id = a;
        assert_eq!(graph.add_node(reuse).unwrap(), a);
    }

    #[test]
    fn test_max_nodes_is_a_hard_limit() {
        let mut graph = Graph::new();
        for i in 0..MAX_NODES {
            graph
                .add_node_deferred(Node::new("n", format!("n{i}")))
                .unwrap();
        }
        let result = graph.add_node(Node::new("n", "overflow"));
        assert!(matches!(result, Err(GraphError::MaxNodesReached(_))));
        assert_eq!(graph.nodes.len(), MAX_NODES);
    }

    #[test]
    fn test_connect_and_disconnect_update_both_slots() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();

        let link_id = graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        assert_eq!(graph.nodes[&a].outputs[0].links, vec![link_id]);
        assert_eq!(graph.nodes[&b].inputs[0].link, Some(link_id));

        assert!(graph.disconnect_input(b, 0));
        assert!(graph.nodes[&a].outputs[0].links.is_empty());
        assert_eq!(graph.nodes[&b].inputs[0].link, None);
        assert!(graph.links.is_empty());
    }

    #[test]
    fn test_connect_severs_occupied_input() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let c = graph.add_node(simple_node("c")).unwrap();

        let first = graph.connect(a, 0, c, 0, None).unwrap().unwrap();
        let second = graph.connect(b, 0, c, 0, None).unwrap().unwrap();
        assert!(!graph.links.contains_key(&first));
        assert_eq!(graph.nodes[&c].inputs[0].link, Some(second));
        assert!(graph.nodes[&a].outputs[0].links.is_empty());
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        assert_eq!(graph.connect(a, 0, a, 0, None).unwrap(), None);
        assert!(graph.links.is_empty());
    }

    #[test]
    fn test_remove_node_severs_everything() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let c = graph.add_node(simple_node("c")).unwrap();
        graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        graph.connect(b, 0, c, 0, None).unwrap().unwrap();

        assert!(graph.remove_node(b));
        assert!(graph.links.is_empty());
        assert!(graph.nodes[&a].outputs[0].links.is_empty());
        assert_eq!(graph.nodes[&c].inputs[0].link, None);
    }

    #[test]
    fn test_protected_node_survives_remove() {
        let mut graph = Graph::new();
        let mut node = simple_node("a");
        node.removable = false;
        let a = graph.add_node(node).unwrap();
        assert!(!graph.remove_node(a));
        assert!(graph.nodes.contains_key(&a));
    }

    #[test]
    fn test_link_reroute_symmetry() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let link_id = graph.connect(a, 0, b, 0, None).unwrap().unwrap();

        let r1 = graph.create_reroute([10.0, 0.0], LinkSegment::Link(link_id)).unwrap();
        let r2 = graph.create_reroute([5.0, 0.0], LinkSegment::Reroute(r1)).unwrap();

        // chain walks origin-first through both
        assert_eq!(graph.reroutes_for_link(link_id), Some(vec![r2, r1]));
        for id in [r1, r2] {
            assert!(graph.reroutes[&id].link_ids.contains(&link_id));
        }

        // removing the link prunes the now-empty reroutes
        assert!(graph.remove_link(link_id));
        assert!(graph.reroutes.is_empty());
    }

    #[test]
    fn test_remove_reroute_splices_chain() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let link_id = graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        let r1 = graph.create_reroute([10.0, 0.0], LinkSegment::Link(link_id)).unwrap();
        let r2 = graph.create_reroute([20.0, 0.0], LinkSegment::Link(link_id)).unwrap();
        // chain: r1 (origin side) <- r2 <- link
        assert_eq!(graph.reroutes_for_link(link_id), Some(vec![r1, r2]));

        assert!(graph.remove_reroute(r2));
        assert_eq!(graph.links[&link_id].parent_id, Some(r1));
        assert_eq!(graph.reroutes_for_link(link_id), Some(vec![r1]));
    }

    #[test]
    fn test_connect_through_reroute_chain() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let c = graph.add_node(simple_node("c")).unwrap();
        let first = graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        let r1 = graph.create_reroute([10.0, 0.0], LinkSegment::Link(first)).unwrap();

        let second = graph.connect(a, 0, c, 0, Some(r1)).unwrap().unwrap();
        assert_eq!(graph.links[&second].parent_id, Some(r1));
        assert!(graph.reroutes[&r1].link_ids.contains(&first));
        assert!(graph.reroutes[&r1].link_ids.contains(&second));
    }

    #[test]
    fn test_floating_link_lifecycle() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let link = Link::new(0, a, 0, NodeId::NONE, -1, "number");
        let id = graph.add_floating_link(link).unwrap();

        assert!(graph.nodes[&a].outputs[0].floating_link_ids.contains(&id));
        let r = graph
            .create_reroute([5.0, 5.0], LinkSegment::FloatingLink(id))
            .unwrap();
        assert!(graph.reroutes[&r].floating_link_ids.contains(&id));
        assert!(graph.reroutes[&r].floating.is_some());

        // dropping the last reference deletes the reroute too
        assert!(graph.remove_floating_link(id));
        assert!(graph.floating_links.is_empty());
        assert!(graph.reroutes.is_empty());
        assert!(graph.nodes[&a].outputs[0].floating_link_ids.is_empty());
    }

    #[test]
    fn test_connect_clears_multi_reroute_floating_chain() {
        let mut graph = Graph::new();
        let a = graph.add_node(simple_node("a")).unwrap();
        let b = graph.add_node(simple_node("b")).unwrap();
        let floating = Link::new(0, a, 0, NodeId::NONE, -1, "number");
        let id = graph.add_floating_link(floating).unwrap();
        let r1 = graph
            .create_reroute([10.0, 0.0], LinkSegment::FloatingLink(id))
            .unwrap();
        let r2 = graph
            .create_reroute([20.0, 0.0], LinkSegment::Reroute(r1))
            .unwrap();
        // the floating link is listed on every reroute of its chain
        assert!(graph.reroutes[&r1].floating_link_ids.contains(&id));
        assert!(graph.reroutes[&r2].floating_link_ids.contains(&id));

        let link_id = graph.connect(a, 0, b, 0, Some(r1)).unwrap().unwrap();
        assert!(graph.floating_links.is_empty());
        for r in [r1, r2] {
            assert!(graph.reroutes[&r].link_ids.contains(&link_id));
            assert!(graph.reroutes[&r].floating_link_ids.is_empty());
            assert_eq!(graph.reroutes[&r].floating, None);
        }
        assert_eq!(graph.links[&link_id].parent_id, Some(r1));
    }

    #[test]
    fn test_group_containment_recompute() {
        let mut graph = Graph::new();
        let mut node = simple_node("a");
        node.pos = [50.0, 50.0];
        node.size = [40.0, 40.0];
        let a = graph.add_node(node).unwrap();

        let group_id = graph.add_group(Group::new(0, "G", Rect::new(0.0, 0.0, 200.0, 200.0)));
        assert!(graph.get_group(group_id).unwrap().child_nodes.contains(&a));

        if let Some(node) = graph.get_node_by_id_mut(a) {
            node.pos = [500.0, 500.0];
        }
        graph.recompute_inside_nodes(group_id);
        assert!(graph.get_group(group_id).unwrap().child_nodes.is_empty());
    }

    #[test]
    fn test_round_trip_reproduces_graph() {
        let registry = registry();
        let mut graph = Graph::new();
        let a = registered_node(&mut graph, &registry);
        let b = registered_node(&mut graph, &registry);
        let link_id = graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        graph.create_reroute([10.0, 0.0], LinkSegment::Link(link_id)).unwrap();
        graph.add_group(Group::new(0, "G", Rect::new(0.0, 0.0, 100.0, 100.0)));

        let record = graph.as_serialisable();
        let mut restored = Graph::new();
        restored.configure(&record, &registry);

        assert_eq!(restored.nodes.len(), 2);
        assert_eq!(restored.links.len(), 1);
        assert_eq!(restored.reroutes.len(), 1);
        assert_eq!(restored.groups.len(), 1);
        assert_eq!(restored.state, graph.state);
        assert_eq!(restored.as_serialisable(), record);
    }

    #[test]
    fn test_round_trip_keeps_floating_links() {
        let registry = registry();
        let mut graph = Graph::new();
        let a = registered_node(&mut graph, &registry);
        let id = graph
            .add_floating_link(Link::new(0, a, 0, NodeId::NONE, -1, "number"))
            .unwrap();

        let record = graph.as_serialisable();
        assert!(record.floating_links.is_some());

        let mut restored = Graph::new();
        restored.configure(&record, &registry);
        assert_eq!(restored.floating_links.len(), 1);
        assert!(restored.floating_links[&id].is_floating());
        assert!(restored.nodes[&a].outputs[0].floating_link_ids.contains(&id));
        assert_eq!(restored.state.last_link_id, graph.state.last_link_id);
    }

    #[test]
    fn test_legacy_record_loads_like_current() {
        let registry = registry();
        let mut graph = Graph::new();
        let a = registered_node(&mut graph, &registry);
        let b = registered_node(&mut graph, &registry);
        let link_id = graph.connect(a, 0, b, 0, None).unwrap().unwrap();
        let r = graph.create_reroute([10.0, 0.0], LinkSegment::Link(link_id)).unwrap();

        let legacy = graph.serialize_legacy();
        assert!(legacy.is_legacy());

        let mut from_legacy = Graph::new();
        from_legacy.configure(&legacy, &registry);
        let mut from_current = Graph::new();
        from_current.configure(&graph.as_serialisable(), &registry);

        assert_eq!(from_legacy.links[&link_id], from_current.links[&link_id]);
        assert_eq!(from_legacy.links[&link_id].parent_id, Some(r));
        assert_eq!(from_legacy.reroutes[&r], from_current.reroutes[&r]);
    }

    #[test]
    fn test_configure_drops_broken_links_and_unknown_types() {
        let registry = registry();
        let record: SerialisedGraph = serde_json::from_str(
            r#"{
                "state": {"lastNodeId": 2, "lastLinkId": 2, "lastGroupId": 0, "lastRerouteId": 0},
                "nodes": [
                    {"id": 1, "type": "test/simple", "pos": [0.0, 0.0]},
                    {"id": 2, "type": "vendor/gone", "pos": [10.0, 10.0]}
                ],
                "links": [
                    {"id": 1, "origin_id": 1, "origin_slot": 0, "target_id": 99,
                     "target_slot": 0, "type": "number"}
                ]
            }"#,
        )
        .unwrap();

        let mut graph = Graph::new();
        graph.configure(&record, &registry);
        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.links.is_empty());
        assert!(graph.nodes[&NodeId::Number(2)].has_errors);
        // the placeholder re-saves its original record
        let saved = graph.as_serialisable();
        assert!(saved.nodes.iter().any(|n| n.type_name == "vendor/gone"));
    }

    #[test]
    fn test_observer_notified_and_detachable() {
        struct Counter(Rc<Cell<usize>>);
        impl GraphObserver for Counter {
            fn mark_dirty(&self, _: bool, _: bool) {
                self.0.set(self.0.get() + 1);
            }
        }

        let count = Rc::new(Cell::new(0));
        let mut graph = Graph::new();
        let id = graph.attach_observer(Box::new(Counter(count.clone())));

        graph.add_node(simple_node("a")).unwrap();
        assert!(count.get() > 0);

        let seen = count.get();
        assert!(graph.detach_observer(id));
        graph.add_node(simple_node("b")).unwrap();
        assert_eq!(count.get(), seen);
    }
}
