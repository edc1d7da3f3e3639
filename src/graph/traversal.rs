//! BFS graph traversal over the relationships table.
//!
//! Every function here takes a plain `&Connection` so a whole traversal runs
//! inside a single blocking task on one (query-only) connection.

use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::graph::{Direction, EdgeFilter, EntityRecord, NeighborRecord, Neighborhood};
use crate::Result;

/// Which edge types a traversal may follow.
#[derive(Debug, Clone, Copy)]
pub enum EdgeSelection<'a> {
    Any,
    Only(&'a EdgeFilter),
}

/// Breadth-first expansion from `root`, up to `depth` hops.
///
/// Each entity is visited at most once, so cycles terminate. A depth of zero
/// or below yields an empty neighborhood. The root never appears among its
/// own neighbors.
pub fn expand_neighborhood(
    conn: &Connection,
    root: &str,
    depth: i32,
    edges: EdgeSelection<'_>,
    direction: Direction,
) -> Result<Neighborhood> {
    let max_depth = u32::try_from(depth).unwrap_or(0);
    let mut neighborhood = Neighborhood::new(root);
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();

    visited.insert(root.to_string());
    queue.push_back((root.to_string(), 0u32));

    while let Some((guid, hops)) = queue.pop_front() {
        if hops >= max_depth {
            continue;
        }

        for next in adjacent_guids(conn, &guid, edges, direction)? {
            if visited.insert(next.clone()) {
                let entity = load_entity_record(conn, &next)?;
                neighborhood.neighbors.push(NeighborRecord {
                    entity,
                    distance: hops + 1,
                });
                queue.push_back((next, hops + 1));
            }
        }
    }

    Ok(neighborhood)
}

/// Guids one hop away from `guid`, outgoing edges first, each group in edge
/// insertion order. May contain duplicates when parallel edges exist.
fn adjacent_guids(
    conn: &Connection,
    guid: &str,
    edges: EdgeSelection<'_>,
    direction: Direction,
) -> Result<Vec<String>> {
    let mut out = Vec::new();
    if direction.follows_outgoing() {
        out.extend(hop(conn, guid, edges, "source_guid", "target_guid")?);
    }
    if direction.follows_incoming() {
        out.extend(hop(conn, guid, edges, "target_guid", "source_guid")?);
    }
    Ok(out)
}

fn hop(
    conn: &Connection,
    guid: &str,
    edges: EdgeSelection<'_>,
    from_column: &str,
    to_column: &str,
) -> Result<Vec<String>> {
    let type_clause = match edges {
        EdgeSelection::Any => String::new(),
        EdgeSelection::Only(filter) => {
            let placeholders = (0..filter.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(",");
            format!(" AND edge_type IN ({})", placeholders)
        }
    };
    let sql = format!(
        "SELECT {to} FROM relationships WHERE {from} = ?1{types} ORDER BY rowid",
        to = to_column,
        from = from_column,
        types = type_clause
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let params: Vec<&str> = match edges {
        EdgeSelection::Any => vec![guid],
        EdgeSelection::Only(filter) => std::iter::once(guid).chain(filter.iter()).collect(),
    };
    let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn entity_exists(conn: &Connection, guid: &str) -> Result<bool> {
    let found = conn
        .prepare_cached("SELECT 1 FROM entities WHERE guid = ?1")?
        .query_row([guid], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Current properties of `guid`, sorted by name.
pub fn load_entity_record(conn: &Connection, guid: &str) -> Result<EntityRecord> {
    let mut stmt =
        conn.prepare_cached("SELECT name, value FROM entity_properties WHERE guid = ?1 ORDER BY name")?;
    let properties: BTreeMap<String, String> = stmt
        .query_map([guid], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<_, rusqlite::Error>>()?;
    Ok(EntityRecord {
        guid: guid.to_string(),
        properties,
    })
}

/// Guids whose `property` value contains `text` (case-sensitive), in entity
/// insertion order. An empty `text` matches every entity carrying `property`.
pub fn find_matching_entities(conn: &Connection, property: &str, text: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT e.guid FROM entities e \
         JOIN entity_properties p ON p.guid = e.guid \
         WHERE p.name = ?1 AND instr(p.value, ?2) > 0 \
         ORDER BY e.rowid",
    )?;
    let guids = stmt
        .query_map([property, text], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(guids)
}
