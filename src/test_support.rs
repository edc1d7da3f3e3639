//! Shared fixtures for in-crate tests.
//!
//! The lineage graph used throughout:
//!
//! ```text
//! p1 -outputs-> t1 -in_db-> db1 -contains-> t1
//!               t1 -has_column-> c1
//!               t1 -has_column-> c2 -references-> t2 -in_db-> db1
//! t3 -derived_from-> t1
//! ```

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::db::{migrate, Db};
use crate::{MetagraphError, Result};

pub(crate) fn migrations_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

/// Fresh migrated database, no data.
pub(crate) async fn empty_db() -> (Db, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::new(temp_dir.path().join("graph.db"));
    let dir = migrations_dir();
    db.with_connection(move |conn| migrate::run_migrations(conn, &dir))
        .await
        .unwrap();
    (db, temp_dir)
}

/// Migrated database holding the lineage graph.
pub(crate) async fn seeded_db() -> (Db, TempDir) {
    let (db, temp_dir) = empty_db().await;
    db.with_connection(|conn| seed_lineage_graph(conn)).await.unwrap();
    (db, temp_dir)
}

pub(crate) fn seed_lineage_graph(conn: &Connection) -> Result<()> {
    let entities: &[(&str, &str, &[(&str, &str)])] = &[
        ("db1", "hive_db", &[("name", "sales_db"), ("owner", "alice")]),
        ("t1", "hive_table", &[("name", "sales_orders"), ("owner", "alice")]),
        ("t2", "hive_table", &[("name", "sales_customers"), ("owner", "bob")]),
        ("c1", "hive_column", &[("name", "order_id"), ("type", "bigint")]),
        ("c2", "hive_column", &[("name", "customer_id"), ("type", "bigint")]),
        ("p1", "process", &[("name", "load_orders")]),
        ("t3", "hive_table", &[("name", "Orders_archive"), ("owner", "carol")]),
    ];
    for (guid, type_name, properties) in entities {
        conn.execute(
            "INSERT INTO entities (guid, type_name) VALUES (?1, ?2)",
            params![guid, type_name],
        )?;
        for (name, value) in properties.iter() {
            conn.execute(
                "INSERT INTO entity_properties (guid, name, value) VALUES (?1, ?2, ?3)",
                params![guid, name, value],
            )?;
        }
    }

    let relationships = [
        ("r1", "t1", "in_db", "db1"),
        ("r2", "t2", "in_db", "db1"),
        ("r3", "t1", "has_column", "c1"),
        ("r4", "t1", "has_column", "c2"),
        ("r5", "p1", "outputs", "t1"),
        ("r6", "t3", "derived_from", "t1"),
        ("r7", "c2", "references", "t2"),
        ("r8", "db1", "contains", "t1"),
    ];
    for (id, source, edge_type, target) in relationships {
        conn.execute(
            "INSERT INTO relationships (relationship_id, source_guid, edge_type, target_guid) \
             VALUES (?1, ?2, ?3, ?4)",
            params![id, source, edge_type, target],
        )?;
    }
    Ok::<(), MetagraphError>(())
}
