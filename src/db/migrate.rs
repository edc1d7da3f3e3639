use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;
use crate::error::{Result, MetagraphError};

/// Tables the graph repository reads and writes.
pub const GRAPH_TABLES: &[&str] = &["entities", "entity_properties", "relationships"];

/// One `NNN_name.sql` file
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of applied migrations, in version order
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

fn applied_versions(conn: &Connection) -> Result<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(versions)
}

fn parse_migration_file(path: &Path) -> Result<Migration> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MetagraphError::Config(format!("Invalid migration filename: {}", path.display())))?;

    // "001_graph_tables.sql" -> 1
    let (version_str, _) = filename
        .split_once('_')
        .ok_or_else(|| MetagraphError::Config(format!("Migration filename lacks version prefix: {}", filename)))?;
    let version: u32 = version_str
        .parse()
        .map_err(|_| MetagraphError::Config(format!("Invalid migration version: {}", version_str)))?;

    Ok(Migration {
        version,
        name: filename.trim_end_matches(".sql").to_string(),
        sql: fs::read_to_string(path)?,
    })
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations = fs::read_dir(migrations_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("sql"))
        .map(|p| parse_migration_file(&p))
        .collect::<Result<Vec<_>>>()?;

    migrations.sort_by_key(|m| m.version);

    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(MetagraphError::Config(format!(
            "Duplicate migration version {}: {} and {}",
            pair[0].version, pair[0].name, pair[1].name
        )));
    }

    Ok(migrations)
}

/// Run all pending migrations, each in its own transaction
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    ensure_migrations_table(conn)?;

    let applied = applied_versions(conn)?;
    let pending: Vec<Migration> = load_migrations(migrations_dir)?
        .into_iter()
        .filter(|m| {
            let done = applied.contains(&m.version);
            if done {
                log::debug!("Migration {} already applied, skipping", m.name);
            }
            !done
        })
        .collect();

    for migration in pending {
        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            MetagraphError::Config(format!("Failed to execute migration {}: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    log::info!("All migrations completed");
    Ok(())
}

/// Tables from [`GRAPH_TABLES`] that are absent
pub fn missing_graph_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in GRAPH_TABLES {
        if !stmt.exists([table])? {
            missing.push(table.to_string());
        }
    }
    Ok(missing)
}
