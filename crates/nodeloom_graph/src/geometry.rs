// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pure geometry over axis-aligned rectangles and points.
//!
//! Everything here is stateless; the graph, group, and subgraph modules build
//! their containment and layout logic on these functions.

use serde::{Deserialize, Serialize};

/// A point in graph space, as `x, y`.
pub type Point = [f32; 2];

/// A width/height pair in graph units.
pub type Size = [f32; 2];

/// An axis-aligned rectangle in graph space.
///
/// Serializes as the wire format's `[x, y, width, height]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl From<[f32; 4]> for Rect {
    fn from(v: [f32; 4]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            width: v[2],
            height: v[3],
        }
    }
}

impl From<Rect> for [f32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

impl Rect {
    /// Create a rectangle from its top-left corner and size.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Centre point.
    pub fn centre(&self) -> Point {
        [self.x + self.width * 0.5, self.y + self.height * 0.5]
    }

    /// Whether `point` lies inside this rectangle.
    ///
    /// Inclusive of the top and left edges, exclusive of bottom and right, so
    /// an integer point on the leftmost or uppermost edge still counts.
    pub fn contains_point(&self, point: Point) -> bool {
        point[0] >= self.x
            && point[0] < self.right()
            && point[1] >= self.y
            && point[1] < self.bottom()
    }

    /// Whether this rectangle contains the centre point of `other`.
    pub fn contains_centre(&self, other: &Rect) -> bool {
        self.contains_point(other.centre())
    }

    /// Whether this rectangle wholly contains `other`.
    ///
    /// Identical rectangles do not contain each other; a group should never
    /// claim itself as a child.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        let identical = self.x == other.x
            && self.y == other.y
            && self.right() == other.right()
            && self.bottom() == other.bottom();

        !identical
            && self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    /// Whether the two rectangles have any overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.x > other.right()
            || self.y > other.bottom()
            || self.right() < other.x
            || self.bottom() < other.y)
    }
}

/// Distance between two points.
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}

/// Union bounding box of `rects`, expanded by `padding` on all sides.
///
/// Returns `None` for an empty iterator or non-finite bounds.
pub fn create_bounds(rects: impl IntoIterator<Item = Rect>, padding: f32) -> Option<Rect> {
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for rect in rects {
        min_x = min_x.min(rect.x);
        min_y = min_y.min(rect.y);
        max_x = max_x.max(rect.right());
        max_y = max_y.max(rect.bottom());
    }

    if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
        return None;
    }

    Some(Rect::new(
        min_x - padding,
        min_y - padding,
        max_x - min_x + 2.0 * padding,
        max_y - min_y + 2.0 * padding,
    ))
}

/// Snap a point to multiples of `snap_to`. Returns `false` if `snap_to` is zero.
pub fn snap_point(pos: &mut Point, snap_to: f32) -> bool {
    if snap_to == 0.0 {
        return false;
    }
    pos[0] = snap_to * (pos[0] / snap_to).round();
    pos[1] = snap_to * (pos[1] / snap_to).round();
    true
}

/// Point at factor `t` along a cubic Bezier curve from `a` to `b`.
pub fn point_on_curve(a: Point, b: Point, control_a: Point, control_b: Point, t: f32) -> Point {
    let it = 1.0 - t;

    let c1 = it * it * it;
    let c2 = 3.0 * (it * it) * t;
    let c3 = 3.0 * it * (t * t);
    let c4 = t * t * t;

    [
        c1 * a[0] + c2 * control_a[0] + c3 * control_b[0] + c4 * b[0],
        c1 * a[1] + c2 * control_a[1] + c3 * control_b[1] + c4 * b[1],
    ]
}

/// Horizontal edge or centre to anchor a rectangle to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAnchor {
    /// Left edge
    Left,
    /// Horizontal centre
    Centre,
    /// Right edge
    Right,
}

/// Vertical edge or middle to anchor a rectangle to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAnchor {
    /// Top edge
    Top,
    /// Vertical middle
    Middle,
    /// Bottom edge
    Bottom,
}

/// Align `rect` against the interior of `container`.
///
/// With a zero inset the rect's edges line up on the container's anchored
/// edges; a positive inset moves it towards the centre.
pub fn align_to_container(
    rect: &mut Rect,
    horizontal: Option<HorizontalAnchor>,
    vertical: Option<VerticalAnchor>,
    container: &Rect,
    inset: Point,
) {
    match horizontal {
        Some(HorizontalAnchor::Left) => rect.x = container.x + inset[0],
        Some(HorizontalAnchor::Right) => rect.x = container.right() - inset[0] - rect.width,
        Some(HorizontalAnchor::Centre) => {
            rect.x = container.x + container.width * 0.5 - rect.width * 0.5;
        }
        None => {}
    }

    match vertical {
        Some(VerticalAnchor::Top) => rect.y = container.y + inset[1],
        Some(VerticalAnchor::Bottom) => rect.y = container.bottom() - inset[1] - rect.height,
        Some(VerticalAnchor::Middle) => {
            rect.y = container.y + container.height * 0.5 - rect.height * 0.5;
        }
        None => {}
    }
}

/// Align `rect` against the exterior of `other`.
///
/// A positive outset moves the rect further away from `other`.
pub fn align_outside_container(
    rect: &mut Rect,
    horizontal: Option<HorizontalAnchor>,
    vertical: Option<VerticalAnchor>,
    other: &Rect,
    outset: Point,
) {
    match horizontal {
        Some(HorizontalAnchor::Left) => rect.x = other.x - outset[0] - rect.width,
        Some(HorizontalAnchor::Right) => rect.x = other.right() + outset[0],
        Some(HorizontalAnchor::Centre) => {
            rect.x = other.x + other.width * 0.5 - rect.width * 0.5;
        }
        None => {}
    }

    match vertical {
        Some(VerticalAnchor::Top) => rect.y = other.y - outset[1] - rect.height,
        Some(VerticalAnchor::Bottom) => rect.y = other.bottom() + outset[1],
        Some(VerticalAnchor::Middle) => {
            rect.y = other.y + other.height * 0.5 - rect.height * 0.5;
        }
        None => {}
    }
}
