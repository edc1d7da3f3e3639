pub mod config;
pub mod error;
pub mod db;
pub mod graph;
pub mod repository;
pub mod discovery;
pub mod mcp;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use discovery::DiscoveryService;
pub use error::{ErrorKind, MetagraphError, Result};
pub use graph::{EdgeFilter, QueryRow, TraversalResult};
pub use repository::{MetadataRepository, SqliteRepository};
