use crate::config::TraversalConfig;
use crate::discovery::DiscoveryService;
use crate::error::{MetagraphError, Result};
use crate::mcp::types::{Tool, ToolsCallResult};
use serde::Deserialize;
use serde_json::{json, Value};

pub const RAW_QUERY_TOOL: &str = "metagraph_raw_query";
pub const TEXT_SEARCH_TOOL: &str = "metagraph_text_search";
pub const RELATIONSHIP_WALK_TOOL: &str = "metagraph_relationship_walk";

/// Get all tool definitions for tools/list
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: RAW_QUERY_TOOL.to_string(),
            description: "Run a query uninterpreted against the graph store (SQL over the entities, entity_properties and relationships tables). Read-only.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Query in the store's native syntax"
                    }
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: TEXT_SEARCH_TOOL.to_string(),
            description: "Find entities whose property contains the given text (case-sensitive) and expand their neighborhoods along any relationship type.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Substring to look for"
                    },
                    "property": {
                        "type": "string",
                        "description": "Entity property to search, e.g. 'name'"
                    },
                    "depth": {
                        "type": "integer",
                        "default": 1,
                        "description": "Maximum hops to expand from each match (0 = matches only)"
                    }
                },
                "required": ["text", "property"]
            }),
        },
        Tool {
            name: RELATIONSHIP_WALK_TOOL.to_string(),
            description: "Walk the graph from one entity, following only the listed relationship types.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "guid": {
                        "type": "string",
                        "description": "Starting entity identifier"
                    },
                    "edges_to_follow": {
                        "type": "string",
                        "description": "Comma-separated relationship types, e.g. 'in_db,has_column'"
                    },
                    "depth": {
                        "type": "integer",
                        "default": 1,
                        "description": "Maximum traversal depth"
                    }
                },
                "required": ["guid", "edges_to_follow"]
            }),
        },
    ]
}

/// Raw query parameters
#[derive(Debug, Deserialize)]
struct RawQueryParams {
    query: Option<String>,
}

/// Text search parameters
#[derive(Debug, Deserialize)]
struct TextSearchParams {
    text: Option<String>,
    property: Option<String>,
    depth: Option<i32>,
}

/// Relationship walk parameters
#[derive(Debug, Deserialize)]
struct RelationshipWalkParams {
    guid: Option<String>,
    edges_to_follow: Option<String>,
    depth: Option<i32>,
}

fn parse_params<T: serde::de::DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments.clone() };
    serde_json::from_value(arguments)
        .map_err(|e| MetagraphError::InvalidArgument(format!("Invalid {} params: {}", tool, e)))
}

fn render(body: Value) -> Result<ToolsCallResult> {
    let text = serde_json::to_string_pretty(&body)
        .map_err(|e| MetagraphError::Config(format!("JSON serialization failed: {}", e)))?;
    Ok(ToolsCallResult::text(text))
}

/// Handle metagraph_raw_query tool
pub async fn handle_raw_query(discovery: &DiscoveryService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: RawQueryParams = parse_params(RAW_QUERY_TOOL, arguments)?;
    let rows = discovery.run_raw_query(params.query.as_deref()).await?;

    render(json!({
        "query": params.query,
        "count": rows.len(),
        "rows": rows,
    }))
}

/// Handle metagraph_text_search tool
pub async fn handle_text_search(
    discovery: &DiscoveryService,
    traversal: &TraversalConfig,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: TextSearchParams = parse_params(TEXT_SEARCH_TOOL, arguments)?;
    let depth = params.depth.unwrap_or(traversal.default_depth);
    let result = discovery
        .find_by_property(params.text.as_deref(), depth, params.property.as_deref())
        .await?;

    render(json!({
        "text": params.text,
        "property": params.property,
        "depth": depth,
        "count": result.len(),
        "results": result,
    }))
}

/// Handle metagraph_relationship_walk tool
pub async fn handle_relationship_walk(
    discovery: &DiscoveryService,
    traversal: &TraversalConfig,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: RelationshipWalkParams = parse_params(RELATIONSHIP_WALK_TOOL, arguments)?;
    let depth = params.depth.unwrap_or(traversal.default_depth);
    let result = discovery
        .walk_relationships(params.guid.as_deref(), depth, params.edges_to_follow.as_deref())
        .await?;

    render(json!({
        "guid": params.guid,
        "edges_to_follow": params.edges_to_follow,
        "depth": depth,
        "results": result,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRepository;
    use crate::test_support::seeded_db;
    use std::sync::Arc;

    fn body(result: &ToolsCallResult) -> Value {
        serde_json::from_str(&result.content[0].text).unwrap()
    }

    async fn discovery() -> (DiscoveryService, tempfile::TempDir) {
        let (db, temp) = seeded_db().await;
        (DiscoveryService::new(Arc::new(SqliteRepository::new(db))), temp)
    }

    #[test]
    fn test_tool_definitions() {
        let names: Vec<String> = get_tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![RAW_QUERY_TOOL, TEXT_SEARCH_TOOL, RELATIONSHIP_WALK_TOOL]);
    }

    #[tokio::test]
    async fn test_text_search_uses_default_depth() {
        let (svc, _temp) = discovery().await;
        let traversal = TraversalConfig::default();
        let result = handle_text_search(&svc, &traversal, &json!({"text": "load_", "property": "name"}))
            .await
            .unwrap();
        let body = body(&result);
        assert_eq!(body["depth"], 1);
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"]["p1"]["t1"]["name"], "sales_orders");
    }

    #[tokio::test]
    async fn test_relationship_walk_result_shape() {
        let (svc, _temp) = discovery().await;
        let result = handle_relationship_walk(
            &svc,
            &TraversalConfig::default(),
            &json!({"guid": "t1", "edges_to_follow": "has_column", "depth": 2}),
        )
        .await
        .unwrap();
        let body = body(&result);
        let neighbors = body["results"]["t1"].as_object().unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(body["results"]["t1"]["c1"]["name"], "order_id");
    }

    #[tokio::test]
    async fn test_missing_argument_is_invalid() {
        let (svc, _temp) = discovery().await;
        let err = handle_relationship_walk(&svc, &TraversalConfig::default(), &json!({"guid": "t1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, MetagraphError::InvalidArgument(_)));

        let err = handle_raw_query(&svc, &Value::Null).await.unwrap_err();
        assert!(matches!(err, MetagraphError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_wrongly_typed_argument_is_invalid() {
        let (svc, _temp) = discovery().await;
        let err = handle_text_search(
            &svc,
            &TraversalConfig::default(),
            &json!({"text": "x", "property": "name", "depth": "deep"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MetagraphError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_raw_query_rows() {
        let (svc, _temp) = discovery().await;
        let result = handle_raw_query(
            &svc,
            &json!({"query": "SELECT edge_type FROM relationships WHERE source_guid = 't1' ORDER BY rowid"}),
        )
        .await
        .unwrap();
        let body = body(&result);
        assert_eq!(body["count"], 3);
        assert_eq!(body["rows"][0]["edge_type"], "in_db");
    }
}
