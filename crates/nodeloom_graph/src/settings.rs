// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide engine settings and layout constants.

use std::sync::atomic::{AtomicBool, Ordering};

/// Hard upper bound on the number of nodes a single graph may contain.
pub const MAX_NODES: usize = 10_000;

/// Height of a node's title bar, in graph units.
///
/// Node positions address the body top-left corner; the title bar sits above
/// it, so bounding rects extend `NODE_TITLE_HEIGHT` past `pos.y`.
pub const NODE_TITLE_HEIGHT: f32 = 30.0;

/// Vertical space allotted to one input or output slot.
pub const NODE_SLOT_HEIGHT: f32 = 20.0;

/// Default node body width.
pub const NODE_WIDTH: f32 = 140.0;

/// How node ids are allocated for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    /// Monotonic numeric ids from the graph's `last_node_id` counter
    Numeric,
    /// Random v4 UUIDs
    Uuid,
}

static USE_UUID_IDS: AtomicBool = AtomicBool::new(false);

/// Set the process-wide node id allocation mode.
///
/// Graphs loaded under one mode keep the ids they were saved with; the mode
/// only affects ids allocated for *new* nodes.
pub fn set_id_mode(mode: IdMode) {
    USE_UUID_IDS.store(mode == IdMode::Uuid, Ordering::Relaxed);
}

/// The current process-wide node id allocation mode.
pub fn id_mode() -> IdMode {
    if USE_UUID_IDS.load(Ordering::Relaxed) {
        IdMode::Uuid
    } else {
        IdMode::Numeric
    }
}
