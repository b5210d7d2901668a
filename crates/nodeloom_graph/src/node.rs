// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node, slot, and node-id definitions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Point, Rect, Size};
use crate::link::LinkId;
use crate::serialization::{SerialisedInput, SerialisedNode, SerialisedOutput};
use crate::settings::{self, IdMode, NODE_SLOT_HEIGHT, NODE_TITLE_HEIGHT, NODE_WIDTH};

/// Unique identifier for a node within a graph.
///
/// Numeric ids come from the graph's monotonic counter; UUID ids are used when
/// the process-wide [`IdMode`] is [`IdMode::Uuid`]. Negative numeric values are
/// reserved sentinels and never identify a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    /// Counter-allocated id
    Number(i64),
    /// Random v4 UUID id
    Uuid(Uuid),
}

impl NodeId {
    /// Sentinel for "no node"; a committed link must never carry it.
    pub const NONE: NodeId = NodeId::Number(-1);
    /// Virtual id of a subgraph's input boundary node.
    pub const SUBGRAPH_INPUT: NodeId = NodeId::Number(-10);
    /// Virtual id of a subgraph's output boundary node.
    pub const SUBGRAPH_OUTPUT: NodeId = NodeId::Number(-20);

    /// Whether this id is one of the reserved sentinels.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, NodeId::Number(n) if *n < 0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Number(n) => write!(f, "{n}"),
            NodeId::Uuid(u) => write!(f, "{u}"),
        }
    }
}

/// Execution mode flag carried by every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum NodeMode {
    /// Execute every step
    #[default]
    Always,
    /// Execute on event
    OnEvent,
    /// Never execute
    Never,
    /// Execute when triggered
    OnTrigger,
    /// Pass inputs through to outputs unchanged
    Bypass,
}

impl From<u8> for NodeMode {
    fn from(v: u8) -> Self {
        match v {
            1 => NodeMode::OnEvent,
            2 => NodeMode::Never,
            3 => NodeMode::OnTrigger,
            4 => NodeMode::Bypass,
            _ => NodeMode::Always,
        }
    }
}

impl From<NodeMode> for u8 {
    fn from(mode: NodeMode) -> Self {
        match mode {
            NodeMode::Always => 0,
            NodeMode::OnEvent => 1,
            NodeMode::Never => 2,
            NodeMode::OnTrigger => 3,
            NodeMode::Bypass => 4,
        }
    }
}

/// Display/behaviour flags for a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    /// Node body is collapsed to its title bar
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub collapsed: bool,
    /// Node cannot be moved by pointer interaction
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
}

/// An input slot. References at most one committed link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSlot {
    /// Slot name
    pub name: String,
    /// Data-type tag; an empty string matches any type
    pub data_type: String,
    /// The committed link feeding this slot, if any
    pub link: Option<LinkId>,
    /// Floating links anchored to this slot
    pub floating_link_ids: BTreeSet<LinkId>,
}

impl InputSlot {
    /// Create a disconnected input slot.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            link: None,
            floating_link_ids: BTreeSet::new(),
        }
    }
}

/// An output slot. References any number of committed links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSlot {
    /// Slot name
    pub name: String,
    /// Data-type tag; an empty string matches any type
    pub data_type: String,
    /// Committed links fanning out from this slot
    pub links: Vec<LinkId>,
    /// Floating links anchored to this slot
    pub floating_link_ids: BTreeSet<LinkId>,
}

impl OutputSlot {
    /// Create a disconnected output slot.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            links: Vec::new(),
            floating_link_ids: BTreeSet::new(),
        }
    }
}

/// A node instance. Owned exclusively by the graph that contains it.
///
/// All structural mutation (connecting, disconnecting, removal) goes through
/// [`Graph`](crate::graph::Graph) operations so slot/link bookkeeping stays
/// consistent; the fields here are data, not an API.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique id within the owning graph
    pub id: NodeId,
    /// Registered type name; a UUID string for subgraph proxy nodes
    pub type_name: String,
    /// Display title
    pub title: String,
    /// Top-left corner of the node body
    pub pos: Point,
    /// Body size
    pub size: Size,
    /// Execution mode
    pub mode: NodeMode,
    /// Execution priority; lower runs earlier. Defaults from the type
    /// definition, overridable per instance.
    pub priority: i32,
    /// Index in the last computed execution order
    pub order: usize,
    /// Depth level from the last execution-order computation, for layout
    pub level: usize,
    /// Ordered input slots
    pub inputs: Vec<InputSlot>,
    /// Ordered output slots
    pub outputs: Vec<OutputSlot>,
    /// Display/behaviour flags
    pub flags: NodeFlags,
    /// If `false`, removal requests are ignored with a warning
    pub removable: bool,
    /// Set on placeholder nodes substituted for unknown types during load
    pub has_errors: bool,
    /// Free-form per-node configuration
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// The record this node failed to load from, kept so saving the file
    /// does not lose data
    pub last_serialization: Option<SerialisedNode>,
}

impl Node {
    /// Create a bare node with no slots.
    pub fn new(type_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: NodeId::NONE,
            type_name: type_name.into(),
            title: title.into(),
            pos: [0.0, 0.0],
            size: [NODE_WIDTH, NODE_SLOT_HEIGHT],
            mode: NodeMode::Always,
            priority: 0,
            order: 0,
            level: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            flags: NodeFlags::default(),
            removable: true,
            has_errors: false,
            properties: serde_json::Map::new(),
            last_serialization: None,
        }
    }

    /// Allocate an id for a freshly created node in the current [`IdMode`].
    ///
    /// `last_node_id` is the graph's counter; it is advanced in numeric mode.
    pub fn allocate_id(last_node_id: &mut i64) -> NodeId {
        match settings::id_mode() {
            IdMode::Numeric => {
                *last_node_id += 1;
                NodeId::Number(*last_node_id)
            }
            IdMode::Uuid => NodeId::Uuid(Uuid::new_v4()),
        }
    }

    /// The subgraph definition this node is a proxy for, if any.
    pub fn subgraph_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.type_name).ok()
    }

    /// Bounding rectangle including the title bar.
    pub fn bounding_rect(&self) -> Rect {
        Rect::new(
            self.pos[0],
            self.pos[1] - NODE_TITLE_HEIGHT,
            self.size[0],
            self.size[1] + NODE_TITLE_HEIGHT,
        )
    }

    /// Whether the given graph-space point is inside the node's bounds.
    pub fn is_point_inside(&self, x: f32, y: f32) -> bool {
        self.bounding_rect().contains_point([x, y])
    }

    /// Size needed to fit the node's slot rows.
    pub fn compute_size(&self) -> Size {
        let rows = self.inputs.len().max(self.outputs.len()).max(1);
        [NODE_WIDTH, rows as f32 * NODE_SLOT_HEIGHT]
    }

    /// Move the node by a delta, unless pinned.
    pub fn move_by(&mut self, delta_x: f32, delta_y: f32) {
        if self.flags.pinned {
            return;
        }
        self.pos[0] += delta_x;
        self.pos[1] += delta_y;
    }

    /// Snap the node's position to a grid. No-op when pinned.
    pub fn snap_to_grid(&mut self, snap_to: f32) -> bool {
        if self.flags.pinned {
            return false;
        }
        crate::geometry::snap_point(&mut self.pos, snap_to)
    }

    /// Apply a serialized record to this node.
    ///
    /// Slot arrays are resized to the record's; slots the record does not
    /// mention keep their defaults from the type definition.
    pub fn configure(&mut self, record: &SerialisedNode) {
        self.id = record.id;
        if let Some(title) = &record.title {
            self.title = title.clone();
        }
        self.pos = record.pos;
        if record.size != [0.0, 0.0] {
            self.size = record.size;
        }
        self.mode = record.mode;
        self.order = record.order;
        self.flags = record.flags;
        self.properties = record.properties.clone();

        for (index, input) in record.inputs.iter().enumerate() {
            if index >= self.inputs.len() {
                self.inputs.push(InputSlot::new(&input.name, &input.data_type));
            }
            self.inputs[index].link = input.link;
        }
        for (index, output) in record.outputs.iter().enumerate() {
            if index >= self.outputs.len() {
                self.outputs
                    .push(OutputSlot::new(&output.name, &output.data_type));
            }
            self.outputs[index].links = output.links.clone();
        }
    }

    /// Project this node into its wire record.
    pub fn as_serialisable(&self) -> SerialisedNode {
        // Placeholder nodes re-emit the record they failed to load from.
        if let Some(last) = &self.last_serialization {
            return last.clone();
        }

        SerialisedNode {
            id: self.id,
            type_name: self.type_name.clone(),
            title: Some(self.title.clone()),
            pos: self.pos,
            size: self.size,
            mode: self.mode,
            order: self.order,
            flags: self.flags,
            inputs: self
                .inputs
                .iter()
                .map(|slot| SerialisedInput {
                    name: slot.name.clone(),
                    data_type: slot.data_type.clone(),
                    link: slot.link,
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|slot| SerialisedOutput {
                    name: slot.name.clone(),
                    data_type: slot.data_type.clone(),
                    links: slot.links.clone(),
                })
                .collect(),
            properties: self.properties.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_sentinels() {
        assert!(NodeId::NONE.is_sentinel());
        assert!(NodeId::SUBGRAPH_INPUT.is_sentinel());
        assert!(!NodeId::Number(1).is_sentinel());
        assert!(!NodeId::Uuid(Uuid::new_v4()).is_sentinel());
    }

    #[test]
    fn test_node_id_untagged_serde() {
        let numeric: NodeId = serde_json::from_str("7").unwrap();
        assert_eq!(numeric, NodeId::Number(7));

        let uuid = Uuid::new_v4();
        let parsed: NodeId = serde_json::from_str(&format!("\"{uuid}\"")).unwrap();
        assert_eq!(parsed, NodeId::Uuid(uuid));
    }

    #[test]
    fn test_uuid_id_mode_allocation() {
        let mut counter = 5;
        settings::set_id_mode(IdMode::Uuid);
        let id = Node::allocate_id(&mut counter);
        settings::set_id_mode(IdMode::Numeric);

        // UUID mode does not touch the numeric counter
        assert!(matches!(id, NodeId::Uuid(_)));
        assert_eq!(counter, 5);

        let numeric = Node::allocate_id(&mut counter);
        assert_eq!(numeric, NodeId::Number(6));
        assert_eq!(counter, 6);
    }

    #[test]
    fn test_bounding_rect_includes_title() {
        let mut node = Node::new("test", "Test");
        node.pos = [100.0, 100.0];
        node.size = [140.0, 60.0];
        let rect = node.bounding_rect();
        assert_eq!(rect.y, 100.0 - NODE_TITLE_HEIGHT);
        assert_eq!(rect.height, 60.0 + NODE_TITLE_HEIGHT);
        assert!(node.is_point_inside(105.0, 80.0));
    }

    #[test]
    fn test_compute_size_scales_with_slots() {
        let mut node = Node::new("test", "Test");
        node.inputs.push(InputSlot::new("a", "number"));
        node.inputs.push(InputSlot::new("b", "number"));
        node.outputs.push(OutputSlot::new("out", "number"));
        assert_eq!(node.compute_size(), [NODE_WIDTH, 2.0 * NODE_SLOT_HEIGHT]);
    }

    #[test]
    fn test_pinned_node_ignores_move() {
        let mut node = Node::new("test", "Test");
        node.flags.pinned = true;
        node.move_by(10.0, 10.0);
        assert_eq!(node.pos, [0.0, 0.0]);
    }
}
