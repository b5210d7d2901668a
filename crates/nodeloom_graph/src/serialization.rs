// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire records for the persisted graph format.
//!
//! Two schema generations are accepted on read. The current schema stores
//! `nodes`, `links`, `floatingLinks`, `groups`, and `reroutes` as flat arrays
//! of typed records plus a `state` counter block. The legacy `version: 0.4`
//! schema stores links as ordered tuples and smuggles reroute data through
//! `extra.linkExtensions` and `extra.reroutes`. Only the current schema is
//! written.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Point, Size};
use crate::group::Group;
use crate::link::{LegacyLinkTuple, Link, LinkId};
use crate::node::{NodeFlags, NodeId, NodeMode};
use crate::reroute::{Reroute, RerouteId};

/// Version marker of the legacy schema.
pub const LEGACY_VERSION: f64 = 0.4;

/// Wire record of an input slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerialisedInput {
    /// Slot name
    pub name: String,
    /// Data-type tag
    #[serde(rename = "type", default)]
    pub data_type: String,
    /// The committed link feeding the slot
    #[serde(default)]
    pub link: Option<LinkId>,
}

/// Wire record of an output slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerialisedOutput {
    /// Slot name
    pub name: String,
    /// Data-type tag
    #[serde(rename = "type", default)]
    pub data_type: String,
    /// Committed links fanning out of the slot
    #[serde(default)]
    pub links: Vec<LinkId>,
}

/// Wire record of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialisedNode {
    /// Node id
    pub id: NodeId,
    /// Registered type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Display title, omitted when the type default applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body top-left corner
    #[serde(default)]
    pub pos: Point,
    /// Body size
    #[serde(default)]
    pub size: Size,
    /// Execution mode
    #[serde(default)]
    pub mode: NodeMode,
    /// Execution-order index at save time
    #[serde(default)]
    pub order: usize,
    /// Display flags
    #[serde(default)]
    pub flags: NodeFlags,
    /// Input slots
    #[serde(default)]
    pub inputs: Vec<SerialisedInput>,
    /// Output slots
    #[serde(default)]
    pub outputs: Vec<SerialisedOutput>,
    /// Free-form per-node configuration
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// A link on the wire: current object form or legacy ordered tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkRecord {
    /// Current schema object
    Object(Link),
    /// Legacy `[id, origin_id, origin_slot, target_id, target_slot, type]`
    Tuple(LegacyLinkTuple),
}

impl From<LinkRecord> for Link {
    fn from(record: LinkRecord) -> Self {
        match record {
            LinkRecord::Object(link) => link,
            LinkRecord::Tuple(tuple) => tuple.into(),
        }
    }
}

/// Monotonic "last used" id counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphState {
    /// Highest numeric node id handed out
    pub last_node_id: i64,
    /// Highest link id handed out
    pub last_link_id: i64,
    /// Highest group id handed out
    pub last_group_id: i64,
    /// Highest reroute id handed out
    pub last_reroute_id: i64,
}

/// Legacy side-channel for per-link reroute parents, stored under
/// `extra.linkExtensions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkExtension {
    /// Link the extension applies to
    pub id: LinkId,
    /// The link's nearest reroute toward its origin
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<RerouteId>,
}

/// Wire record of an exported subgraph port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphPortRecord {
    /// Stable port id
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Data-type tag
    #[serde(rename = "type", default)]
    pub data_type: String,
}

/// Wire record of a subgraph definition: its ports plus a full graph record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialisedSubgraph {
    /// Definition id; proxy nodes reference it through their type name
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Imported ports, one per pseudo-slot on the input boundary node
    #[serde(default)]
    pub inputs: Vec<SubgraphPortRecord>,
    /// Exported ports, one per pseudo-slot on the output boundary node
    #[serde(default)]
    pub outputs: Vec<SubgraphPortRecord>,
    /// The nested graph's own tables
    #[serde(flatten)]
    pub graph: SerialisedGraph,
}

/// Nested definition tables, currently subgraphs only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerialisedDefinitions {
    /// Exported subgraph definitions
    #[serde(default)]
    pub subgraphs: Vec<SerialisedSubgraph>,
}

/// The persisted form of a whole graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerialisedGraph {
    /// Schema version; `0.4` selects the legacy read path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<f64>,
    /// Id counters (current schema)
    #[serde(default)]
    pub state: GraphState,
    /// Legacy top-level node counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_node_id: Option<i64>,
    /// Legacy top-level link counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_link_id: Option<i64>,
    /// Node records
    #[serde(default)]
    pub nodes: Vec<SerialisedNode>,
    /// Committed links, in either record shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<LinkRecord>>,
    /// Floating links (current schema only)
    #[serde(rename = "floatingLinks", default, skip_serializing_if = "Option::is_none")]
    pub floating_links: Option<Vec<Link>>,
    /// Groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    /// Reroutes (current schema only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reroutes: Option<Vec<Reroute>>,
    /// Nested subgraph definitions, pruned to referenced ids on write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitions: Option<SerialisedDefinitions>,
    /// Free-form host data; the legacy schema also stores reroute data here
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SerialisedGraph {
    /// Whether this record uses the legacy `version: 0.4` schema.
    ///
    /// When the marker is present alongside current-schema arrays, the marker
    /// wins and the current-schema reroute data is ignored.
    pub fn is_legacy(&self) -> bool {
        self.version == Some(LEGACY_VERSION)
    }

    /// Resolve the record's links and reroutes across both generations.
    ///
    /// Links come back keyed by id with parent ids applied; reroutes come back
    /// in record order. Malformed legacy side-channel entries are skipped with
    /// a warning.
    pub fn resolve_links_and_reroutes(&self) -> (IndexMap<LinkId, Link>, Vec<Reroute>) {
        let mut links: IndexMap<LinkId, Link> = IndexMap::new();
        for record in self.links.iter().flatten() {
            let link: Link = record.clone().into();
            links.insert(link.id, link);
        }

        let reroutes = if self.is_legacy() {
            for extension in self.legacy_extra_array::<LinkExtension>("linkExtensions") {
                match links.get_mut(&extension.id) {
                    Some(link) => link.parent_id = extension.parent_id,
                    None => tracing::warn!(
                        link_id = extension.id,
                        "link extension references an unknown link; skipped"
                    ),
                }
            }
            self.legacy_extra_array::<Reroute>("reroutes")
        } else {
            self.reroutes.clone().unwrap_or_default()
        };

        (links, reroutes)
    }

    /// The id counters, whichever generation carried them.
    pub fn resolved_state(&self) -> GraphState {
        let mut state = self.state;
        if let Some(last_node_id) = self.last_node_id {
            state.last_node_id = state.last_node_id.max(last_node_id);
        }
        if let Some(last_link_id) = self.last_link_id {
            state.last_link_id = state.last_link_id.max(last_link_id);
        }
        state
    }

    fn legacy_extra_array<T: serde::de::DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let Some(value) = self.extra.get(key) else {
            return Vec::new();
        };
        match serde_json::from_value(value.clone()) {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(key, %error, "malformed legacy extra array; ignored");
                Vec::new()
            }
        }
    }
}
