// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rectangular organizational containers.
//!
//! A group's child set is derived purely from geometry and recomputed on
//! demand by [`Graph::recompute_inside_nodes`](crate::graph::Graph::recompute_inside_nodes);
//! nothing here owns the children.

use serde::{Deserialize, Serialize};

use crate::geometry::{self, Point, Rect};
use crate::node::NodeId;
use crate::reroute::RerouteId;
use crate::settings::NODE_TITLE_HEIGHT;

/// Unique identifier for a group within its owning graph.
pub type GroupId = i64;

/// A rectangle aggregating the nodes, reroutes, and groups inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Unique id within the owning graph
    pub id: GroupId,
    /// Display title
    pub title: String,
    /// The group's rectangle, title bar included
    pub bounding: Rect,
    /// A pinned group ignores move and resize requests
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
    /// Nodes whose centre lies inside the rectangle. Derived, never persisted.
    #[serde(skip)]
    pub child_nodes: Vec<NodeId>,
    /// Reroutes whose point lies inside the rectangle. Derived.
    #[serde(skip)]
    pub child_reroutes: Vec<RerouteId>,
    /// Groups wholly contained in the rectangle. Derived.
    #[serde(skip)]
    pub child_groups: Vec<GroupId>,
}

impl Group {
    /// Create a group covering the given rectangle.
    pub fn new(id: GroupId, title: impl Into<String>, bounding: Rect) -> Self {
        Self {
            id,
            title: title.into(),
            bounding,
            pinned: false,
            child_nodes: Vec::new(),
            child_reroutes: Vec::new(),
            child_groups: Vec::new(),
        }
    }

    /// Height of the title bar at the top of the rectangle.
    pub fn title_height(&self) -> f32 {
        NODE_TITLE_HEIGHT
    }

    /// Whether `point` is inside the group's rectangle.
    pub fn contains_point(&self, point: Point) -> bool {
        self.bounding.contains_point(point)
    }

    /// Whether `point` is inside the title bar strip.
    pub fn is_point_in_title(&self, point: Point) -> bool {
        Rect::new(
            self.bounding.x,
            self.bounding.y,
            self.bounding.width,
            self.title_height(),
        )
        .contains_point(point)
    }

    /// Move the group by a delta, unless pinned. Children are moved by the
    /// owning graph, which knows where they live.
    pub fn move_by(&mut self, delta_x: f32, delta_y: f32) -> bool {
        if self.pinned {
            return false;
        }
        self.bounding.x += delta_x;
        self.bounding.y += delta_y;
        true
    }

    /// Resize the rectangle to wrap `content_bounds` plus `padding` on all
    /// sides, growing upward so the title bar sits above the content.
    pub fn resize_to(&mut self, content_bounds: Rect, padding: f32) -> bool {
        if self.pinned {
            return false;
        }
        self.bounding = Rect::new(
            content_bounds.x - padding,
            content_bounds.y - padding - self.title_height(),
            content_bounds.width + 2.0 * padding,
            content_bounds.height + 2.0 * padding + self.title_height(),
        );
        true
    }

    /// Resize to wrap the given item rectangles. No-op for an empty set.
    pub fn resize_to_fit(&mut self, items: impl IntoIterator<Item = Rect>, padding: f32) -> bool {
        match geometry::create_bounds(items, 0.0) {
            Some(bounds) => self.resize_to(bounds, padding),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_group_rejects_move_and_resize() {
        let mut group = Group::new(1, "G", Rect::new(0.0, 0.0, 100.0, 100.0));
        group.pinned = true;
        assert!(!group.move_by(10.0, 0.0));
        assert!(!group.resize_to(Rect::new(0.0, 0.0, 10.0, 10.0), 5.0));
        assert_eq!(group.bounding, Rect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_resize_to_adds_title_height_upward() {
        let mut group = Group::new(1, "G", Rect::new(0.0, 0.0, 1.0, 1.0));
        let content = Rect::new(50.0, 50.0, 100.0, 60.0);
        assert!(group.resize_to(content, 10.0));
        assert_eq!(group.bounding.x, 40.0);
        assert_eq!(group.bounding.y, 40.0 - group.title_height());
        assert_eq!(group.bounding.width, 120.0);
        assert_eq!(group.bounding.height, 80.0 + group.title_height());
    }

    #[test]
    fn test_point_in_title() {
        let group = Group::new(1, "G", Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(group.is_point_in_title([50.0, 10.0]));
        assert!(!group.is_point_in_title([50.0, 50.0]));
    }
}
