// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subgraph definitions.
//!
//! A subgraph is a graph plus two synthetic boundary nodes. Links inside the
//! nested graph address the boundary with the sentinel ids
//! [`NodeId::SUBGRAPH_INPUT`] and [`NodeId::SUBGRAPH_OUTPUT`]; the slot index
//! on such a link selects the exported port. Proxy nodes in the parent graph
//! reference the definition through their type name, which is the definition
//! id rendered as a string.

use uuid::Uuid;

use crate::geometry::{Point, Rect};
use crate::graph::Graph;
use crate::node::{InputSlot, Node, NodeId, OutputSlot};
use crate::registry::NodeRegistry;
use crate::serialization::{SerialisedSubgraph, SubgraphPortRecord};
use crate::settings::{NODE_SLOT_HEIGHT, NODE_WIDTH};

/// One exported connection of a subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphPort {
    /// Stable id, kept across renames
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Data-type tag
    pub data_type: String,
}

/// A reusable nested graph with an input and an output boundary.
#[derive(Debug, Clone)]
pub struct Subgraph {
    /// Definition id; proxy nodes carry it as their type name
    pub id: Uuid,
    /// Display name, used as the proxy node title
    pub name: String,
    /// The nested graph
    pub graph: Graph,
    /// Imported ports, one pseudo-slot each on the input boundary node
    pub inputs: Vec<SubgraphPort>,
    /// Exported ports, one pseudo-slot each on the output boundary node
    pub outputs: Vec<SubgraphPort>,
    /// Where the input boundary node is drawn
    pub input_node_pos: Point,
    /// Where the output boundary node is drawn
    pub output_node_pos: Point,
}

impl Subgraph {
    /// Create an empty definition.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            graph: Graph::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_node_pos: [0.0, 0.0],
            output_node_pos: [0.0, 0.0],
        }
    }

    /// Add an imported port; returns its slot index on the boundary node.
    pub fn add_input(&mut self, name: impl Into<String>, data_type: impl Into<String>) -> usize {
        self.inputs.push(SubgraphPort {
            id: Uuid::new_v4(),
            name: name.into(),
            data_type: data_type.into(),
        });
        self.inputs.len() - 1
    }

    /// Add an exported port; returns its slot index on the boundary node.
    pub fn add_output(&mut self, name: impl Into<String>, data_type: impl Into<String>) -> usize {
        self.outputs.push(SubgraphPort {
            id: Uuid::new_v4(),
            name: name.into(),
            data_type: data_type.into(),
        });
        self.outputs.len() - 1
    }

    /// Rectangle of the input boundary node, sized to its port count.
    pub fn input_node_rect(&self) -> Rect {
        boundary_rect(self.input_node_pos, self.inputs.len())
    }

    /// Rectangle of the output boundary node.
    pub fn output_node_rect(&self) -> Rect {
        boundary_rect(self.output_node_pos, self.outputs.len())
    }

    /// Build the node that stands in for this definition in a parent graph.
    ///
    /// The proxy arrives without an id; the parent graph assigns one on add.
    pub fn create_proxy_node(&self) -> Node {
        let mut node = Node::new(self.id.to_string(), &self.name);
        node.inputs = self
            .inputs
            .iter()
            .map(|port| InputSlot::new(&port.name, &port.data_type))
            .collect();
        node.outputs = self
            .outputs
            .iter()
            .map(|port| OutputSlot::new(&port.name, &port.data_type))
            .collect();
        node.size = node.compute_size();
        node
    }

    /// Rebuild a definition from its wire record.
    pub fn from_record(record: &SerialisedSubgraph, registry: &NodeRegistry) -> Self {
        let mut subgraph = Subgraph::new(record.id, &record.name);
        subgraph.inputs = record.inputs.iter().map(port_from_record).collect();
        subgraph.outputs = record.outputs.iter().map(port_from_record).collect();
        subgraph.graph.configure(&record.graph, registry);
        subgraph
    }

    /// Project the definition into its wire record.
    pub fn as_serialisable(&self) -> SerialisedSubgraph {
        SerialisedSubgraph {
            id: self.id,
            name: self.name.clone(),
            inputs: self.inputs.iter().map(port_record).collect(),
            outputs: self.outputs.iter().map(port_record).collect(),
            graph: self.graph.as_serialisable(),
        }
    }
}

fn boundary_rect(pos: Point, ports: usize) -> Rect {
    Rect::new(
        pos[0],
        pos[1],
        NODE_WIDTH,
        ports.max(1) as f32 * NODE_SLOT_HEIGHT,
    )
}

fn port_from_record(record: &SubgraphPortRecord) -> SubgraphPort {
    SubgraphPort {
        id: record.id,
        name: record.name.clone(),
        data_type: record.data_type.clone(),
    }
}

fn port_record(port: &SubgraphPort) -> SubgraphPortRecord {
    SubgraphPortRecord {
        id: port.id,
        name: port.name.clone(),
        data_type: port.data_type.clone(),
    }
}

/// Whether a link endpoint addresses one of the boundary nodes.
pub fn is_boundary_id(id: NodeId) -> bool {
    id == NodeId::SUBGRAPH_INPUT || id == NodeId::SUBGRAPH_OUTPUT
}
