//! Metadata graph model: entities, relationships, edge filters, traversal results.
//!
//! Traversal itself (BFS with depth limits and edge-type filters) lives in
//! [`traversal`]; it runs against the SQLite store and is driven by the
//! repository.

pub mod document;
mod edge_filter;
mod result;
pub mod traversal;

pub use document::GraphDocument;
pub use edge_filter::EdgeFilter;
pub use result::{EntityRecord, NeighborRecord, Neighborhood, QueryRow, TraversalResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A vertex in the metadata graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique identifier, opaque to the discovery layer.
    pub guid: String,
    /// Entity type, e.g. `hive_table`, `hive_column`.
    pub type_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Entity {
    pub fn new(guid: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// A typed, directed edge (source --edge_type--> target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(alias = "source")]
    pub source_guid: String,
    pub edge_type: String,
    #[serde(alias = "target")]
    pub target_guid: String,
}

impl Relationship {
    pub fn new(
        source_guid: impl Into<String>,
        edge_type: impl Into<String>,
        target_guid: impl Into<String>,
    ) -> Self {
        Self {
            source_guid: source_guid.into(),
            edge_type: edge_type.into(),
            target_guid: target_guid.into(),
        }
    }
}

/// Which way edges are followed during neighbor expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// source -> target
    Outgoing,
    /// target -> source
    Incoming,
    Both,
}

impl Direction {
    pub fn follows_outgoing(self) -> bool {
        matches!(self, Direction::Outgoing | Direction::Both)
    }

    pub fn follows_incoming(self) -> bool {
        matches!(self, Direction::Incoming | Direction::Both)
    }
}
