//! Result shapes returned by discovery operations.
//!
//! On the wire a [`TraversalResult`] is the nested mapping
//! `guid -> neighborGuid -> propertyName -> propertyValue`, emitted in
//! traversal order.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// One raw-query row: column name -> rendered value.
pub type QueryRow = BTreeMap<String, String>;

/// An entity together with its properties as read at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRecord {
    pub guid: String,
    pub properties: BTreeMap<String, String>,
}

/// A neighbor reached during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborRecord {
    pub entity: EntityRecord,
    /// Hop count at which the neighbor was first reached (>= 1).
    pub distance: u32,
}

impl NeighborRecord {
    pub fn guid(&self) -> &str {
        &self.entity.guid
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.entity.properties
    }
}

/// A root entity and every distinct neighbor reached from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighborhood {
    pub guid: String,
    pub neighbors: Vec<NeighborRecord>,
}

impl Neighborhood {
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            neighbors: Vec::new(),
        }
    }

    pub fn neighbor(&self, guid: &str) -> Option<&NeighborRecord> {
        self.neighbors.iter().find(|n| n.guid() == guid)
    }

    pub fn neighbor_guids(&self) -> impl Iterator<Item = &str> {
        self.neighbors.iter().map(NeighborRecord::guid)
    }

    /// Farthest hop recorded, 0 when there are no neighbors.
    pub fn max_distance(&self) -> u32 {
        self.neighbors.iter().map(|n| n.distance).max().unwrap_or(0)
    }
}

impl Serialize for Neighborhood {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.neighbors.iter().map(|n| (n.guid(), n.properties())))
    }
}

/// Root guid -> neighborhood, unique by root, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalResult {
    neighborhoods: Vec<Neighborhood>,
}

impl TraversalResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a neighborhood; an existing entry for the same root is replaced in place.
    pub fn insert(&mut self, neighborhood: Neighborhood) {
        match self.neighborhoods.iter_mut().find(|n| n.guid == neighborhood.guid) {
            Some(existing) => *existing = neighborhood,
            None => self.neighborhoods.push(neighborhood),
        }
    }

    pub fn get(&self, guid: &str) -> Option<&Neighborhood> {
        self.neighborhoods.iter().find(|n| n.guid == guid)
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.get(guid).is_some()
    }

    pub fn len(&self) -> usize {
        self.neighborhoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighborhood> {
        self.neighborhoods.iter()
    }

    pub fn guids(&self) -> impl Iterator<Item = &str> {
        self.neighborhoods.iter().map(|n| n.guid.as_str())
    }

    /// Plain nested maps, for callers that want the untyped shape.
    pub fn to_nested(&self) -> BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>> {
        self.neighborhoods
            .iter()
            .map(|n| {
                let neighbors = n
                    .neighbors
                    .iter()
                    .map(|r| (r.guid().to_string(), r.properties().clone()))
                    .collect();
                (n.guid.clone(), neighbors)
            })
            .collect()
    }
}

impl IntoIterator for TraversalResult {
    type Item = Neighborhood;
    type IntoIter = std::vec::IntoIter<Neighborhood>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighborhoods.into_iter()
    }
}

impl Serialize for TraversalResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.neighborhoods.iter().map(|n| (n.guid.as_str(), n)))
    }
}
