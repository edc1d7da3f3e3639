//! Edge-type filter parsed from a comma-separated list.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{MetagraphError, Result};

/// Set of edge-type names a relationship walk may follow.
///
/// Always non-empty: parsing rejects any token that is empty after trimming,
/// which also rejects the empty string itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeFilter {
    edge_types: BTreeSet<String>,
}

impl EdgeFilter {
    /// Parse `"knows, owns,knows"` into `{knows, owns}`.
    pub fn parse(edges_to_follow: &str) -> Result<Self> {
        let mut edge_types = BTreeSet::new();
        for (position, token) in edges_to_follow.split(',').enumerate() {
            let edge_type = token.trim();
            if edge_type.is_empty() {
                return Err(MetagraphError::InvalidArgument(format!(
                    "\"edgesToFollow\" has an empty edge type at position {} in {:?}",
                    position + 1,
                    edges_to_follow
                )));
            }
            edge_types.insert(edge_type.to_string());
        }
        Ok(Self { edge_types })
    }

    pub fn contains(&self, edge_type: &str) -> bool {
        self.edge_types.contains(edge_type)
    }

    pub fn len(&self) -> usize {
        self.edge_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_types.is_empty()
    }

    /// Edge types in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.edge_types.iter().map(String::as_str)
    }
}

impl FromStr for EdgeFilter {
    type Err = MetagraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for EdgeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.iter().collect::<Vec<_>>().join(",");
        f.write_str(&joined)
    }
}
