//! Discovery dispatch: validate requests, then hand them to the repository.
//!
//! Parameters that may be absent on the wire are `Option<&str>`; `None` is
//! rejected with [`MetagraphError::InvalidArgument`] before the repository is
//! touched. Everything the repository returns, results and errors alike,
//! passes through unchanged.

use std::sync::Arc;

use crate::graph::{EdgeFilter, QueryRow, TraversalResult};
use crate::repository::MetadataRepository;
use crate::{MetagraphError, Result};

/// Stateless front door for the three query modalities.
#[derive(Clone)]
pub struct DiscoveryService {
    repository: Arc<dyn MetadataRepository>,
}

impl DiscoveryService {
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self { repository }
    }

    /// Run `query` uninterpreted against the store.
    ///
    /// The caller is assumed to know the storage schema. Rows are returned
    /// exactly as the repository produced them.
    pub async fn run_raw_query(&self, query: Option<&str>) -> Result<Vec<QueryRow>> {
        let query = require("query", query)?;
        if query.trim().is_empty() {
            return reject("\"query\" cannot be empty.".to_string());
        }
        log::debug!("Raw query: {}", query);
        self.repository.run_raw_query(query).await
    }

    /// Text match on `property`, plus everything within `depth` hops of each match.
    pub async fn find_by_property(
        &self,
        search_text: Option<&str>,
        depth: i32,
        property: Option<&str>,
    ) -> Result<TraversalResult> {
        let search_text = require("text", search_text)?;
        let property = require("prop", property)?;
        log::debug!(
            "Text search: text={:?} property={:?} depth={}",
            search_text,
            property,
            depth
        );
        self.repository.find_by_property(search_text, depth, property).await
    }

    /// Walk from `guid` following only the comma-separated `edges_to_follow`.
    pub async fn walk_relationships(
        &self,
        guid: Option<&str>,
        depth: i32,
        edges_to_follow: Option<&str>,
    ) -> Result<TraversalResult> {
        let guid = require("guid", guid)?;
        let edges_to_follow = require("edgesToFollow", edges_to_follow)?;
        let edge_filter = EdgeFilter::parse(edges_to_follow).map_err(|e| {
            log::warn!("Rejected relationship walk from {}: {}", guid, e);
            e
        })?;
        log::debug!(
            "Relationship walk: guid={} depth={} edges={}",
            guid,
            depth,
            edge_filter
        );
        self.repository.walk_relationships(guid, depth, &edge_filter).await
    }
}

fn require<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) => Ok(v),
        None => reject(format!("\"{}\" cannot be null.", name)),
    }
}

fn reject<T>(message: String) -> Result<T> {
    log::warn!("Rejected discovery request: {}", message);
    Err(MetagraphError::InvalidArgument(message))
}
