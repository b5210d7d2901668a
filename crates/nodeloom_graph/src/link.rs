// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed edges between node slots.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::reroute::RerouteId;

/// Unique identifier for a link within its owning graph.
pub type LinkId = i64;

/// A directed edge from an output slot to an input slot.
///
/// A committed link has both endpoints resolved; a floating link has exactly
/// one endpoint set to [`NodeId::NONE`] and lives in the graph's separate
/// floating-link table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Unique id within the owning graph
    pub id: LinkId,
    /// Origin node
    pub origin_id: NodeId,
    /// Output slot index on the origin node
    pub origin_slot: i32,
    /// Target node
    pub target_id: NodeId,
    /// Input slot index on the target node
    pub target_slot: i32,
    /// Data-type tag carried by the connection
    #[serde(rename = "type", default)]
    pub data_type: String,
    /// Nearest reroute this link passes through, walking toward the origin
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RerouteId>,
}

impl Link {
    /// Create a committed link between two resolved endpoints.
    pub fn new(
        id: LinkId,
        origin_id: NodeId,
        origin_slot: i32,
        target_id: NodeId,
        target_slot: i32,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            origin_id,
            origin_slot,
            target_id,
            target_slot,
            data_type: data_type.into(),
            parent_id: None,
        }
    }

    /// Whether the origin endpoint is resolved.
    pub fn has_origin(&self) -> bool {
        self.origin_id != NodeId::NONE
    }

    /// Whether the target endpoint is resolved.
    pub fn has_target(&self) -> bool {
        self.target_id != NodeId::NONE
    }

    /// A floating link has exactly one absent endpoint.
    pub fn is_floating(&self) -> bool {
        self.has_origin() != self.has_target()
    }

    /// Which side of a floating link is still attached.
    ///
    /// `None` for committed links.
    pub fn floating_anchor(&self) -> Option<FloatingSlotKind> {
        match (self.has_origin(), self.has_target()) {
            (true, false) => Some(FloatingSlotKind::Output),
            (false, true) => Some(FloatingSlotKind::Input),
            _ => None,
        }
    }
}

/// The slot side a floating link (or a floating reroute chain) is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatingSlotKind {
    /// Anchored at a target input slot
    Input,
    /// Anchored at an origin output slot
    Output,
}

/// Legacy wire form of a link: an ordered tuple
/// `[id, origin_id, origin_slot, target_id, target_slot, type]`.
///
/// The type tag may be `null` in old files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyLinkTuple(
    pub LinkId,
    pub NodeId,
    pub i32,
    pub NodeId,
    pub i32,
    #[serde(default)] pub Option<String>,
);

impl From<LegacyLinkTuple> for Link {
    fn from(t: LegacyLinkTuple) -> Self {
        Link::new(t.0, t.1, t.2, t.3, t.4, t.5.unwrap_or_default())
    }
}

impl From<&Link> for LegacyLinkTuple {
    fn from(link: &Link) -> Self {
        LegacyLinkTuple(
            link.id,
            link.origin_id,
            link.origin_slot,
            link.target_id,
            link.target_slot,
            Some(link.data_type.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floating_predicates() {
        let committed = Link::new(1, NodeId::Number(1), 0, NodeId::Number(2), 0, "number");
        assert!(!committed.is_floating());
        assert_eq!(committed.floating_anchor(), None);

        let from_output = Link::new(2, NodeId::Number(1), 0, NodeId::NONE, -1, "number");
        assert!(from_output.is_floating());
        assert_eq!(from_output.floating_anchor(), Some(FloatingSlotKind::Output));

        let into_input = Link::new(3, NodeId::NONE, -1, NodeId::Number(2), 0, "number");
        assert_eq!(into_input.floating_anchor(), Some(FloatingSlotKind::Input));
    }

    #[test]
    fn test_legacy_tuple_round_trip() {
        let json = "[4, 1, 0, 2, 1, \"number\"]";
        let tuple: LegacyLinkTuple = serde_json::from_str(json).unwrap();
        let link = Link::from(tuple.clone());
        assert_eq!(link.id, 4);
        assert_eq!(link.origin_id, NodeId::Number(1));
        assert_eq!(link.target_slot, 1);
        assert_eq!(LegacyLinkTuple::from(&link), tuple);
    }
}
