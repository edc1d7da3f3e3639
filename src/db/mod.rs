use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, MetagraphError};

const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536; \
     PRAGMA busy_timeout = 5000;";

/// Database connection wrapper
///
/// Holds only the path; every call opens its own connection on the blocking
/// pool, so a `Db` can be shared freely between concurrent requests.
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with the standard pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        open_with_pragmas(&self.path)
    }

    /// Execute a closure with a read-write connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = open_with_pragmas(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(join_error)?
    }

    /// Execute a closure with a connection that rejects every write.
    ///
    /// `query_only` makes INSERT/UPDATE/DELETE/DDL fail with SQLITE_READONLY,
    /// including statements smuggled in through raw queries.
    pub async fn with_read_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            if !path.exists() {
                return Err(MetagraphError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Database file does not exist: {}", path.display()),
                )));
            }
            let conn = open_with_pragmas(&path)?;
            conn.execute_batch("PRAGMA query_only = ON;")?;
            f(&conn)
        })
        .await
        .map_err(join_error)?
    }
}

fn open_with_pragmas(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(MetagraphError::Storage)?;
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    Ok(conn)
}

fn join_error(e: task::JoinError) -> MetagraphError {
    MetagraphError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Blocking database task failed: {}", e),
    ))
}

pub mod migrate;
