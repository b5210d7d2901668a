// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reroutes: user-placed waypoints a link's path is bent through.
//!
//! A reroute chain is walked toward the link's origin via `parent_id`. The
//! chain must terminate; a cycle is state corruption, and chain walks report
//! it rather than looping.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::link::{FloatingSlotKind, LinkId};

/// Unique identifier for a reroute within its owning graph.
pub type RerouteId = i64;

/// Marks a reroute as the current terminus of a floating chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerouteFloating {
    /// Which slot side the floating chain is anchored to
    #[serde(rename = "slotType")]
    pub slot_type: FloatingSlotKind,
}

/// A waypoint on one or more links' paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reroute {
    /// Unique id within the owning graph
    pub id: RerouteId,
    /// Next reroute toward the links' origin, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RerouteId>,
    /// Position in graph space
    pub pos: Point,
    /// Committed links passing through this waypoint
    #[serde(default)]
    pub link_ids: BTreeSet<LinkId>,
    /// Floating links passing through this waypoint. Rebuilt from the
    /// floating-link table on load, never persisted.
    #[serde(skip)]
    pub floating_link_ids: BTreeSet<LinkId>,
    /// Set when this reroute is the terminus of a floating chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating: Option<RerouteFloating>,
}

impl Reroute {
    /// Create a reroute carrying the given committed links.
    pub fn new(
        id: RerouteId,
        pos: Point,
        parent_id: Option<RerouteId>,
        link_ids: impl IntoIterator<Item = LinkId>,
    ) -> Self {
        Self {
            id,
            parent_id,
            pos,
            link_ids: link_ids.into_iter().collect(),
            floating_link_ids: BTreeSet::new(),
            floating: None,
        }
    }

    /// Committed plus floating links through this waypoint.
    pub fn total_link_count(&self) -> usize {
        self.link_ids.len() + self.floating_link_ids.len()
    }

    /// A reroute referenced by no link at all is garbage.
    pub fn is_garbage(&self) -> bool {
        self.total_link_count() == 0
    }

    /// Drop a link id from both reference sets.
    pub fn remove_link(&mut self, link_id: LinkId) {
        self.link_ids.remove(&link_id);
        self.floating_link_ids.remove(&link_id);
        if self.floating_link_ids.is_empty() {
            self.floating = None;
        }
    }
}

/// Walk a reroute chain from `start` toward the origin.
///
/// Returns the chain ordered origin-first (the reroute nearest the origin at
/// index 0, `start` last), or `None` when the parent chain revisits a reroute.
/// Parent ids that do not resolve simply terminate the walk.
pub fn chain_to_origin(
    reroutes: &IndexMap<RerouteId, Reroute>,
    start: Option<RerouteId>,
) -> Option<Vec<RerouteId>> {
    let mut chain = Vec::new();
    let mut seen = BTreeSet::new();
    let mut current = start;

    while let Some(id) = current {
        if !seen.insert(id) {
            return None;
        }
        let Some(reroute) = reroutes.get(&id) else {
            break;
        };
        chain.push(id);
        current = reroute.parent_id;
    }

    chain.reverse();
    Some(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_fixture() -> IndexMap<RerouteId, Reroute> {
        // 1 <- 2 <- 3, origin side at 1
        let mut reroutes = IndexMap::new();
        reroutes.insert(1, Reroute::new(1, [0.0, 0.0], None, [10]));
        reroutes.insert(2, Reroute::new(2, [10.0, 0.0], Some(1), [10]));
        reroutes.insert(3, Reroute::new(3, [20.0, 0.0], Some(2), [10]));
        reroutes
    }

    #[test]
    fn test_chain_to_origin_ordering() {
        let reroutes = chain_fixture();
        assert_eq!(chain_to_origin(&reroutes, Some(3)), Some(vec![1, 2, 3]));
        assert_eq!(chain_to_origin(&reroutes, Some(1)), Some(vec![1]));
        assert_eq!(chain_to_origin(&reroutes, None), Some(vec![]));
    }

    #[test]
    fn test_chain_to_origin_detects_cycle() {
        let mut reroutes = chain_fixture();
        reroutes.get_mut(&1).unwrap().parent_id = Some(3);
        assert_eq!(chain_to_origin(&reroutes, Some(3)), None);
    }

    #[test]
    fn test_unresolvable_parent_terminates_walk() {
        let mut reroutes = chain_fixture();
        reroutes.get_mut(&1).unwrap().parent_id = Some(99);
        assert_eq!(chain_to_origin(&reroutes, Some(3)), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_remove_link_clears_floating_marker() {
        let mut reroute = Reroute::new(1, [0.0, 0.0], None, []);
        reroute.floating_link_ids.insert(7);
        reroute.floating = Some(RerouteFloating {
            slot_type: FloatingSlotKind::Output,
        });
        reroute.remove_link(7);
        assert!(reroute.is_garbage());
        assert_eq!(reroute.floating, None);
    }
}
