use crate::config::TraversalConfig;
use crate::discovery::DiscoveryService;
use crate::error::{MetagraphError, Result};
use crate::mcp::tools;
use crate::mcp::types::*;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP Server implementation
pub struct McpServer {
    discovery: DiscoveryService,
    traversal: TraversalConfig,
}

impl McpServer {
    pub fn new(discovery: DiscoveryService, traversal: TraversalConfig) -> Self {
        Self {
            discovery,
            traversal,
        }
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    pub fn traversal(&self) -> &TraversalConfig {
        &self.traversal
    }

    /// Process an MCP JSON-RPC request (transport-agnostic)
    ///
    /// Returns `Ok(None)` for notifications. Handler failures are turned into
    /// JSON-RPC error responses carrying the error kind in `data.kind`.
    pub async fn process_mcp_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Result<Option<JsonRpcResponse>> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                }
                return Ok(None);
            }
        };

        // HTTP is stateless, so initialization is not enforced before tools/*
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "shutdown" => Ok(JsonRpcResponse::result(id.clone(), Value::Null)),
            _ => Ok(JsonRpcResponse::error(
                id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
                None,
            )),
        };

        match response {
            Ok(resp) => Ok(Some(resp)),
            Err(e) => Ok(Some(error_response(id, &e))),
        }
    }

    /// Run the MCP server (reads from stdin, writes to stdout)
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdin_reader = AsyncBufReader::new(stdin);
        let mut stdout = tokio::io::stdout();

        let mut line = String::new();
        let mut initialized = false;

        log::info!("Metagraph MCP server v{} starting on stdio", env!("CARGO_PKG_VERSION"));

        loop {
            line.clear();
            let bytes_read = stdin_reader.read_line(&mut line).await?;

            // EOF - client disconnected
            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    if let Some(id) = extract_id_from_line(trimmed) {
                        let error_response = JsonRpcResponse::error(
                            id,
                            error_codes::PARSE_ERROR,
                            format!("Parse error: {}", e),
                            None,
                        );
                        send_response(&mut stdout, &error_response).await?;
                    } else {
                        log::warn!("Dropping unparseable message without id: {}", e);
                    }
                    continue;
                }
            };

            if request.jsonrpc != "2.0" {
                if let Some(id) = request.id.clone() {
                    let error_response = JsonRpcResponse::error(
                        id,
                        error_codes::INVALID_REQUEST,
                        format!("Unsupported jsonrpc version: {}", request.jsonrpc),
                        None,
                    );
                    send_response(&mut stdout, &error_response).await?;
                }
                continue;
            }

            match self.process_mcp_request(request, &mut initialized).await {
                Ok(Some(response)) => send_response(&mut stdout, &response).await?,
                Ok(None) => {
                    if initialized {
                        log::info!("Client initialized");
                    }
                }
                Err(e) => log::error!("Unexpected error in process_mcp_request: {}", e),
            }
        }

        log::info!("MCP server shutting down");
        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams = serde_json::from_value(params.clone().unwrap_or(json!({})))
            .map_err(|e| MetagraphError::InvalidArgument(format!("Invalid initialize params: {}", e)))?;

        let protocol_version = if params.protocol_version.starts_with("2024")
            || params.protocol_version.starts_with("2025")
        {
            "2024-11-05".to_string()
        } else {
            params.protocol_version.clone()
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: json!({ "tools": {} }),
            server_info: ServerInfo {
                name: "metagraph".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::result(id.clone(), to_value(&result)?))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(),
        };
        Ok(JsonRpcResponse::result(id.clone(), to_value(&result)?))
    }

    async fn handle_tools_call(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(
            params
                .clone()
                .ok_or_else(|| MetagraphError::InvalidArgument("Missing params for tools/call".to_string()))?,
        )
        .map_err(|e| MetagraphError::InvalidArgument(format!("Invalid tools/call params: {}", e)))?;

        let result = match params.name.as_str() {
            tools::RAW_QUERY_TOOL => tools::handle_raw_query(&self.discovery, &params.arguments).await?,
            tools::TEXT_SEARCH_TOOL => {
                tools::handle_text_search(&self.discovery, &self.traversal, &params.arguments).await?
            }
            tools::RELATIONSHIP_WALK_TOOL => {
                tools::handle_relationship_walk(&self.discovery, &self.traversal, &params.arguments)
                    .await?
            }
            _ => {
                return Ok(JsonRpcResponse::error(
                    id.clone(),
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {}", params.name),
                    None,
                ));
            }
        };

        Ok(JsonRpcResponse::result(id.clone(), to_value(&result)?))
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| MetagraphError::McpProtocol(format!("JSON serialization error: {}", e)))
}

/// JSON-RPC error for a failed handler, preserving the error kind.
fn error_response(id: JsonRpcId, err: &MetagraphError) -> JsonRpcResponse {
    let kind = err.kind();
    match kind {
        crate::ErrorKind::Internal | crate::ErrorKind::Storage => {
            log::error!("MCP request failed: {}", err)
        }
        _ => log::debug!("MCP request rejected: {}", err),
    }
    JsonRpcResponse::error(
        id,
        error_codes::for_kind(kind),
        err.to_string(),
        Some(json!({ "kind": kind.as_str() })),
    )
}

/// Send JSON-RPC response to stdout (newline-delimited)
async fn send_response(stdout: &mut tokio::io::Stdout, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| MetagraphError::McpProtocol(format!("JSON serialization error: {}", e)))?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Pull the `id` out of a line that failed to parse as a request.
fn extract_id_from_line(line: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(line).ok()?;
    match value.get("id")? {
        id @ (Value::String(_) | Value::Number(_)) => Some(id.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRepository;
    use crate::test_support::seeded_db;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn server() -> (McpServer, TempDir) {
        let (db, temp) = seeded_db().await;
        let discovery = DiscoveryService::new(Arc::new(SqliteRepository::new(db)));
        (McpServer::new(discovery, TraversalConfig::default()), temp)
    }

    fn request(json: Value) -> JsonRpcRequest {
        serde_json::from_value(json).unwrap()
    }

    async fn call(server: &McpServer, json: Value) -> Value {
        let mut initialized = false;
        let response = server
            .process_mcp_request(request(json), &mut initialized)
            .await
            .unwrap()
            .unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_extract_id_from_line() {
        // valid JSON, wrong request shape
        let line = r#"{"jsonrpc":"2.0","id":"test-123","method":7}"#;
        assert_eq!(extract_id_from_line(line), Some(Value::String("test-123".to_string())));

        let line = r#"{"jsonrpc":"2.0","id":42}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(42)));

        assert_eq!(extract_id_from_line("{not json"), None);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let (server, _temp) = server().await;
        let mut initialized = false;
        let response = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
                &mut initialized,
            )
            .await
            .unwrap();
        assert!(response.is_none());
        assert!(initialized);
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let (server, _temp) = server().await;
        let init = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2025-06-18"}}),
        )
        .await;
        assert_eq!(init["result"]["serverInfo"]["name"], "metagraph");
        assert_eq!(init["result"]["protocolVersion"], "2024-11-05");

        let list = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_tools_call_walk() {
        let (server, _temp) = server().await;
        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0", "id": "w", "method": "tools/call",
                "params": {"name": "metagraph_relationship_walk", "arguments": {"guid": "c2", "edges_to_follow": "references,in_db", "depth": 2}}
            }),
        )
        .await;
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        let mut neighbors: Vec<&String> = body["results"]["c2"].as_object().unwrap().keys().collect();
        neighbors.sort();
        assert_eq!(neighbors, vec!["db1", "t2"]);
    }

    #[tokio::test]
    async fn test_error_kinds_preserved() {
        let (server, _temp) = server().await;

        let missing = call(
            &server,
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "metagraph_relationship_walk", "arguments": {"guid": "nope", "edges_to_follow": "in_db"}}
            }),
        )
        .await;
        assert_eq!(missing["error"]["code"], error_codes::NOT_FOUND);
        assert_eq!(missing["error"]["data"]["kind"], "NotFound");

        let null_arg = call(
            &server,
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "metagraph_text_search", "arguments": {"text": "x", "property": null}}
            }),
        )
        .await;
        assert_eq!(null_arg["error"]["code"], error_codes::INVALID_PARAMS);
        assert_eq!(null_arg["error"]["data"]["kind"], "InvalidArgument");

        let bad_query = call(
            &server,
            json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "metagraph_raw_query", "arguments": {"query": "SELEKT 1"}}
            }),
        )
        .await;
        assert_eq!(bad_query["error"]["data"]["kind"], "QueryExecutionError");
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let (server, _temp) = server().await;
        let method = call(&server, json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"})).await;
        assert_eq!(method["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let tool = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(tool["error"]["code"], error_codes::INVALID_PARAMS);
    }
}
