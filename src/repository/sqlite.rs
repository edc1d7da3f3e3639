//! SQLite-backed metadata repository.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::types::ValueRef;
use rusqlite::{params, Batch, Connection, OptionalExtension};
use uuid::Uuid;

use crate::config::TraversalConfig;
use crate::db::Db;
use crate::graph::traversal::{
    entity_exists, expand_neighborhood, find_matching_entities, EdgeSelection,
};
use crate::graph::{EdgeFilter, Entity, GraphDocument, QueryRow, Relationship, TraversalResult};
use crate::repository::MetadataRepository;
use crate::{MetagraphError, Result};

/// Counts reported by [`SqliteRepository::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub entities: usize,
    pub relationships: usize,
}

/// Graph store over the `entities` / `entity_properties` / `relationships`
/// tables. Reads run on query-only connections.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db: Db,
    traversal: TraversalConfig,
}

impl SqliteRepository {
    pub fn new(db: Db) -> Self {
        Self::with_traversal(db, TraversalConfig::default())
    }

    pub fn with_traversal(db: Db, traversal: TraversalConfig) -> Self {
        Self { db, traversal }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Insert or replace an entity and its full property set.
    pub async fn store_entity(&self, entity: &Entity) -> Result<()> {
        let entity = entity.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                upsert_entity(&tx, &entity)?;
                tx.commit()?;
                log::info!("Stored entity {} ({})", entity.guid, entity.type_name);
                Ok(())
            })
            .await
    }

    /// Store an edge; storing the same (source, type, target) again is a no-op.
    /// Returns the relationship id.
    pub async fn store_relationship(&self, relationship: &Relationship) -> Result<String> {
        let relationship = relationship.clone();
        self.db
            .with_connection(move |conn| insert_relationship(conn, &relationship))
            .await
    }

    /// Remove an entity with its properties and every edge touching it.
    pub async fn delete_entity(&self, guid: &str) -> Result<bool> {
        let guid = guid.to_string();
        self.db
            .with_connection(move |conn| {
                let deleted = conn.execute("DELETE FROM entities WHERE guid = ?1", [&guid])? > 0;
                if deleted {
                    log::info!("Deleted entity {}", guid);
                }
                Ok(deleted)
            })
            .await
    }

    pub async fn get_entity(&self, guid: &str) -> Result<Entity> {
        let guid = guid.to_string();
        self.db
            .with_read_connection(move |conn| {
                let type_name: String = conn
                    .query_row("SELECT type_name FROM entities WHERE guid = ?1", [&guid], |row| {
                        row.get(0)
                    })
                    .optional()?
                    .ok_or_else(|| MetagraphError::NotFound(guid.clone()))?;
                let record = crate::graph::traversal::load_entity_record(conn, &guid)?;
                Ok(Entity {
                    guid: record.guid,
                    type_name,
                    properties: record.properties,
                })
            })
            .await
    }

    /// Load a whole graph document in one transaction; any failure rolls
    /// everything back.
    pub async fn import(&self, document: GraphDocument) -> Result<ImportSummary> {
        let (entities, relationships) = document.into_parts()?;
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                for entity in &entities {
                    upsert_entity(&tx, entity)?;
                }
                for relationship in &relationships {
                    insert_relationship(&tx, relationship)?;
                }
                tx.commit()?;

                let summary = ImportSummary {
                    entities: entities.len(),
                    relationships: relationships.len(),
                };
                log::info!(
                    "Imported {} entities and {} relationships",
                    summary.entities,
                    summary.relationships
                );
                Ok(summary)
            })
            .await
    }
}

fn upsert_entity(conn: &Connection, entity: &Entity) -> Result<()> {
    if entity.guid.trim().is_empty() {
        return Err(MetagraphError::InvalidArgument("entity guid cannot be empty".to_string()));
    }
    if entity.type_name.trim().is_empty() {
        return Err(MetagraphError::InvalidArgument(format!(
            "entity {} has an empty type_name",
            entity.guid
        )));
    }

    conn.execute(
        "INSERT INTO entities (guid, type_name) VALUES (?1, ?2) \
         ON CONFLICT(guid) DO UPDATE SET type_name = excluded.type_name",
        params![entity.guid, entity.type_name],
    )?;
    conn.execute("DELETE FROM entity_properties WHERE guid = ?1", [&entity.guid])?;
    let mut stmt =
        conn.prepare_cached("INSERT INTO entity_properties (guid, name, value) VALUES (?1, ?2, ?3)")?;
    for (name, value) in &entity.properties {
        stmt.execute(params![entity.guid, name, value])?;
    }
    Ok(())
}

fn insert_relationship(conn: &Connection, relationship: &Relationship) -> Result<String> {
    if relationship.edge_type.trim().is_empty() {
        return Err(MetagraphError::InvalidArgument(format!(
            "relationship {} -> {} has an empty edge_type",
            relationship.source_guid, relationship.target_guid
        )));
    }
    for endpoint in [&relationship.source_guid, &relationship.target_guid] {
        if !entity_exists(conn, endpoint)? {
            return Err(MetagraphError::NotFound(endpoint.to_string()));
        }
    }

    conn.execute(
        "INSERT INTO relationships (relationship_id, source_guid, edge_type, target_guid) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(source_guid, edge_type, target_guid) DO NOTHING",
        params![
            Uuid::new_v4().to_string(),
            relationship.source_guid,
            relationship.edge_type,
            relationship.target_guid
        ],
    )?;
    let id = conn.query_row(
        "SELECT relationship_id FROM relationships \
         WHERE source_guid = ?1 AND edge_type = ?2 AND target_guid = ?3",
        params![relationship.source_guid, relationship.edge_type, relationship.target_guid],
        |row| row.get::<_, String>(0),
    )?;
    Ok(id)
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "null".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        // TEXT is not guaranteed to be UTF-8; fall back to base64 like blobs
        ValueRef::Text(t) => match std::str::from_utf8(t) {
            Ok(text) => text.to_string(),
            Err(_) => STANDARD.encode(t),
        },
        ValueRef::Blob(b) => STANDARD.encode(b),
    }
}

/// First column name that occurs twice; rows are keyed by column name.
fn duplicate_column(columns: &[String]) -> Option<&str> {
    let mut seen = std::collections::HashSet::new();
    columns
        .iter()
        .find(|c| !seen.insert(c.as_str()))
        .map(String::as_str)
}

fn query_error(e: rusqlite::Error) -> MetagraphError {
    MetagraphError::QueryExecution(e.to_string())
}

#[async_trait]
impl MetadataRepository for SqliteRepository {
    async fn run_raw_query(&self, query: &str) -> Result<Vec<QueryRow>> {
        let query = query.to_string();
        self.db
            .with_read_connection(move |conn| {
                let mut batch = Batch::new(conn, &query);
                let mut stmt = batch.next().map_err(query_error)?.ok_or_else(|| {
                    MetagraphError::QueryExecution("query contains no statement".to_string())
                })?;
                if batch.next().map_err(query_error)?.is_some() {
                    return Err(MetagraphError::QueryExecution(
                        "query contains more than one statement".to_string(),
                    ));
                }

                let columns: Vec<String> =
                    stmt.column_names().into_iter().map(String::from).collect();
                if let Some(duplicate) = duplicate_column(&columns) {
                    return Err(MetagraphError::QueryExecution(format!(
                        "duplicate result column {:?}; alias columns to distinct names",
                        duplicate
                    )));
                }

                let mut rows = stmt.query([]).map_err(query_error)?;
                let mut out = Vec::new();
                while let Some(row) = rows.next().map_err(query_error)? {
                    let mut rendered = QueryRow::new();
                    for (idx, column) in columns.iter().enumerate() {
                        let value = row.get_ref(idx).map_err(query_error)?;
                        rendered.insert(column.clone(), render_value(value));
                    }
                    out.push(rendered);
                }
                Ok(out)
            })
            .await
    }

    async fn find_by_property(
        &self,
        text: &str,
        depth: i32,
        property: &str,
    ) -> Result<TraversalResult> {
        let text = text.to_string();
        let property = property.to_string();
        let direction = self.traversal.text_search_direction;
        self.db
            .with_read_connection(move |conn| {
                let mut result = TraversalResult::new();
                for guid in find_matching_entities(conn, &property, &text)? {
                    let neighborhood =
                        expand_neighborhood(conn, &guid, depth, EdgeSelection::Any, direction)?;
                    result.insert(neighborhood);
                }
                log::debug!(
                    "Text search {:?} on {:?} (depth {}) matched {} entities",
                    text,
                    property,
                    depth,
                    result.len()
                );
                Ok(result)
            })
            .await
    }

    async fn walk_relationships(
        &self,
        guid: &str,
        depth: i32,
        edge_filter: &EdgeFilter,
    ) -> Result<TraversalResult> {
        let guid = guid.to_string();
        let edge_filter = edge_filter.clone();
        let direction = self.traversal.walk_direction;
        self.db
            .with_read_connection(move |conn| {
                if !entity_exists(conn, &guid)? {
                    return Err(MetagraphError::NotFound(guid));
                }
                let neighborhood = expand_neighborhood(
                    conn,
                    &guid,
                    depth,
                    EdgeSelection::Only(&edge_filter),
                    direction,
                )?;
                let mut result = TraversalResult::new();
                result.insert(neighborhood);
                Ok(result)
            })
            .await
    }
}
