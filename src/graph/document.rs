//! Graph documents: JSON/YAML files describing entities and relationships
//! to load into a store.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use uuid::Uuid;

use crate::graph::{Entity, Relationship};
use crate::{MetagraphError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub entities: Vec<EntityEntry>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// An entity as written in a document; `guid` is generated when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityEntry {
    #[serde(default)]
    pub guid: Option<String>,
    pub type_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl GraphDocument {
    /// Read a document, choosing the format from the file extension
    /// (`.json`, `.yaml`, `.yml`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            other => Err(MetagraphError::Parse(format!(
                "Unsupported graph document extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| MetagraphError::Parse(format!("Invalid JSON graph document: {}", e)))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml_ng::from_str(text)
            .map_err(|e| MetagraphError::Parse(format!("Invalid YAML graph document: {}", e)))
    }

    /// Validate and split into storable parts.
    ///
    /// Rejects duplicate guids within the document and empty type or edge
    /// names. Relationship endpoints are checked later, against the store.
    pub fn into_parts(self) -> Result<(Vec<Entity>, Vec<Relationship>)> {
        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(self.entities.len());

        for entry in self.entities {
            let guid = match entry.guid {
                Some(g) if !g.trim().is_empty() => g,
                Some(_) => {
                    return Err(MetagraphError::Parse("entity guid cannot be blank".to_string()))
                }
                None => Uuid::new_v4().to_string(),
            };
            if entry.type_name.trim().is_empty() {
                return Err(MetagraphError::Parse(format!("entity {} has no type_name", guid)));
            }
            if !seen.insert(guid.clone()) {
                return Err(MetagraphError::Parse(format!("duplicate entity guid {}", guid)));
            }
            entities.push(Entity {
                guid,
                type_name: entry.type_name,
                properties: entry.properties,
            });
        }

        for relationship in &self.relationships {
            if relationship.edge_type.trim().is_empty() {
                return Err(MetagraphError::Parse(format!(
                    "relationship {} -> {} has no edge_type",
                    relationship.source_guid, relationship.target_guid
                )));
            }
        }

        Ok((entities, self.relationships))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MetadataRepository, SqliteRepository};
    use crate::test_support::empty_db;
    use crate::EdgeFilter;
    use tempfile::TempDir;

    const YAML_DOC: &str = r#"
entities:
  - guid: db
    type_name: hive_db
    properties:
      name: finance
  - guid: tbl
    type_name: hive_table
    properties:
      name: ledger
  - type_name: tag
relationships:
  - source_guid: tbl
    edge_type: in_db
    target_guid: db
"#;

    #[test]
    fn test_yaml_document_parts() {
        let doc = GraphDocument::from_yaml(YAML_DOC).unwrap();
        let (entities, relationships) = doc.into_parts().unwrap();
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].properties["name"], "finance");
        // generated guid for the anonymous tag
        assert_eq!(entities[2].guid.len(), 36);
        assert_eq!(relationships, vec![Relationship::new("tbl", "in_db", "db")]);
    }

    #[test]
    fn test_json_document_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"entities": [{"guid": "a", "type_name": "node"}], "relationships": []}"#,
        )
        .unwrap();
        let doc = GraphDocument::from_path(&path).unwrap();
        assert_eq!(doc.entities.len(), 1);
        assert_eq!(doc.entities[0].guid.as_deref(), Some("a"));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("graph.xml");
        std::fs::write(&path, "<graph/>").unwrap();
        assert!(matches!(GraphDocument::from_path(&path), Err(MetagraphError::Parse(_))));
    }

    #[test]
    fn test_short_endpoint_names_accepted() {
        let doc = GraphDocument::from_yaml(
            r#"
entities:
  - guid: a
    type_name: node
  - guid: b
    type_name: node
relationships:
  - { source: a, edge_type: knows, target: b }
  - { source_guid: b, edge_type: knows, target_guid: a }
"#,
        )
        .unwrap();
        let (_, relationships) = doc.into_parts().unwrap();
        assert_eq!(
            relationships,
            vec![Relationship::new("a", "knows", "b"), Relationship::new("b", "knows", "a")]
        );
    }

    #[test]
    fn test_duplicate_guid_rejected() {
        let doc = GraphDocument::from_json(
            r#"{"entities": [{"guid": "a", "type_name": "x"}, {"guid": "a", "type_name": "y"}]}"#,
        )
        .unwrap();
        assert!(matches!(doc.into_parts(), Err(MetagraphError::Parse(_))));
    }

    #[test]
    fn test_blank_edge_type_rejected() {
        let doc = GraphDocument::from_json(
            r#"{"relationships": [{"source_guid": "a", "edge_type": " ", "target_guid": "b"}]}"#,
        )
        .unwrap();
        assert!(doc.into_parts().is_err());
    }

    #[tokio::test]
    async fn test_import_then_walk() {
        let (db, _temp) = empty_db().await;
        let repo = SqliteRepository::new(db);
        let summary = repo.import(GraphDocument::from_yaml(YAML_DOC).unwrap()).await.unwrap();
        assert_eq!(summary.entities, 3);
        assert_eq!(summary.relationships, 1);

        let result = repo
            .walk_relationships("tbl", 1, &EdgeFilter::parse("in_db").unwrap())
            .await
            .unwrap();
        let db_record = result.get("tbl").unwrap().neighbor("db").unwrap();
        assert_eq!(db_record.properties()["name"], "finance");
    }

    #[tokio::test]
    async fn test_import_rolls_back_on_dangling_edge() {
        let (db, _temp) = empty_db().await;
        let repo = SqliteRepository::new(db);
        let doc = GraphDocument::from_json(
            r#"{
                "entities": [{"guid": "a", "type_name": "node"}],
                "relationships": [{"source_guid": "a", "edge_type": "knows", "target_guid": "ghost"}]
            }"#,
        )
        .unwrap();
        let err = repo.import(doc).await.unwrap_err();
        assert!(matches!(err, MetagraphError::NotFound(_)));
        assert!(matches!(repo.get_entity("a").await, Err(MetagraphError::NotFound(_))));
    }
}
