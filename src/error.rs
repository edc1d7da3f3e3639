use thiserror::Error;

/// Main error type for Metagraph
#[derive(Error, Debug)]
pub enum MetagraphError {
    /// A required parameter is missing/empty, or an edge filter is malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced starting entity does not exist
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Raw query rejected by the store (syntax, unknown column, attempted write...)
    #[error("Query execution error: {0}")]
    QueryExecution(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse errors (graph documents, wire payloads)
    #[error("Parse error: {0}")]
    Parse(String),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

/// Stable classification of [`MetagraphError`], preserved across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    QueryExecution,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::QueryExecution => "QueryExecutionError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl MetagraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetagraphError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MetagraphError::NotFound(_) => ErrorKind::NotFound,
            MetagraphError::QueryExecution(_) => ErrorKind::QueryExecution,
            MetagraphError::Storage(_) | MetagraphError::Io(_) => ErrorKind::Storage,
            MetagraphError::Config(_)
            | MetagraphError::Parse(_)
            | MetagraphError::McpProtocol(_) => ErrorKind::Internal,
        }
    }
}

/// Convenient Result type using MetagraphError
pub type Result<T> = std::result::Result<T, MetagraphError>;
