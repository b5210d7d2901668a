// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine error types.

use uuid::Uuid;

use crate::node::NodeId;
use crate::reroute::RerouteId;

/// Hard failures raised by graph mutation.
///
/// These indicate engine-state corruption or a violated structural limit, and
/// cannot be recovered from mid-operation. Routine caller mistakes (removing a
/// protected node, referencing a missing id) are *not* errors; they are logged
/// and ignored so speculative UI queries stay cheap.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The configured maximum node count was reached
    #[error("maximum number of nodes in a graph reached ({0})")]
    MaxNodesReached(usize),

    /// A reroute parent chain loops back on itself
    #[error("reroute parent chain contains a cycle at reroute {0}")]
    RerouteCycle(RerouteId),

    /// An id could not be resolved while unpacking a subgraph
    #[error("broken id link while unpacking subgraph: {0}")]
    BrokenIdLink(String),

    /// A selection operation was given nothing to work with
    #[error("cannot convert to subgraph: nothing to convert")]
    EmptySelection,

    /// The node is not a subgraph proxy node
    #[error("node {0} is not a subgraph node")]
    NotASubgraphNode(NodeId),

    /// No subgraph definition exists for the given id
    #[error("subgraph definition not found: {0}")]
    SubgraphNotFound(Uuid),
}
