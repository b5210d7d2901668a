// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory node graph engine for NodeLoom.
//!
//! This crate owns the data model a visual graph editor mutates:
//! - Typed nodes with input/output slots
//! - Links, reroute waypoint chains, and floating (half-connected) links
//! - Geometric groups and nested subgraph definitions
//!
//! ## Architecture
//!
//! [`Graph`] is the aggregate root; all structural mutation goes through it so
//! slot, link, and reroute bookkeeping stays symmetric. On top of the model sit:
//! - Execution-order computation (topological sort with priority tie-break)
//! - Selection-to-subgraph packing and its inverse ([`convert`])
//! - A versioned wire format accepting two schema generations
//!   ([`serialization`])

pub mod geometry;
pub mod settings;
pub mod error;
pub mod node;
pub mod registry;
pub mod link;
pub mod reroute;
pub mod group;
pub mod graph;
mod execution;
pub mod subgraph;
pub mod convert;
pub mod serialization;

pub use convert::{convert_to_subgraph, unpack_subgraph, PackResult, Selection, UnpackResult};
pub use error::GraphError;
pub use graph::{Graph, GraphObserver, LinkSegment, ObserverId};
pub use group::{Group, GroupId};
pub use link::{FloatingSlotKind, Link, LinkId};
pub use node::{InputSlot, Node, NodeId, NodeMode, OutputSlot};
pub use registry::{NodeRegistry, NodeTypeDef};
pub use reroute::{Reroute, RerouteId};
pub use serialization::SerialisedGraph;
pub use subgraph::Subgraph;
