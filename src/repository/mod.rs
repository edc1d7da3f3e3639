//! Storage seam for discovery.
//!
//! [`MetadataRepository`] is everything the discovery layer needs from a
//! store. [`SqliteRepository`] is the bundled implementation.

mod sqlite;

pub use sqlite::{ImportSummary, SqliteRepository};

use async_trait::async_trait;

use crate::graph::{EdgeFilter, QueryRow, TraversalResult};
use crate::Result;

/// Read-side contract a graph store must satisfy.
///
/// Implementations must be safe for concurrent reads and must not modify the
/// graph from any of these operations.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Execute `query` in the store's native query language, uninterpreted.
    ///
    /// Rows come back in store order. A query the store cannot execute fails
    /// with [`MetagraphError::QueryExecution`](crate::MetagraphError::QueryExecution).
    async fn run_raw_query(&self, query: &str) -> Result<Vec<QueryRow>>;

    /// Entities whose `property` contains `text`, each expanded breadth-first
    /// over edges of any type up to `depth` hops.
    async fn find_by_property(&self, text: &str, depth: i32, property: &str)
        -> Result<TraversalResult>;

    /// Breadth-first walk from `guid` along edges whose type is in
    /// `edge_filter`, up to `depth` hops.
    ///
    /// Fails with [`MetagraphError::NotFound`](crate::MetagraphError::NotFound)
    /// when `guid` does not exist.
    async fn walk_relationships(
        &self,
        guid: &str,
        depth: i32,
        edge_filter: &EdgeFilter,
    ) -> Result<TraversalResult>;
}
