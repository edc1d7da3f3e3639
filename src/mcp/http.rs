use crate::config::{HttpServerConfig, TraversalConfig};
use crate::discovery::DiscoveryService;
use crate::error::{ErrorKind, MetagraphError, Result};
use crate::mcp::server::McpServer;
use crate::mcp::types::*;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await.is_ok()
}

/// HTTP front end: MCP JSON-RPC on `/mcp` plus the REST discovery routes
pub struct HttpMcpServer {
    state: AppState,
}

impl HttpMcpServer {
    pub fn new(
        discovery: DiscoveryService,
        traversal: TraversalConfig,
        config: &HttpServerConfig,
    ) -> Result<Self> {
        // API key is optional if authless mode is enabled
        let api_key = if config.authless {
            String::new()
        } else {
            std::env::var(&config.api_key_env).map_err(|_| {
                MetagraphError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.api_key_env
                ))
            })?
        };

        let server = Arc::new(McpServer::new(discovery, traversal));
        Ok(Self {
            state: AppState {
                server,
                api_key,
                allowed_origins: config.allowed_origins.clone(),
                authless: config.authless,
            },
        })
    }

    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();

        let addr = format!("127.0.0.1:{}", port);
        log::info!("Starting HTTP server on http://{}", addr);
        log::info!("MCP endpoint: http://{}/mcp", addr);
        log::info!("REST endpoints: http://{}{}/...", addr, API_PREFIX);

        if !check_port_available(port).await {
            return Err(MetagraphError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    fn create_router(&self) -> Router {
        build_router(self.state.clone())
    }
}

const API_PREFIX: &str = "/api/metadata/discovery";

fn build_router(state: AppState) -> Router {
    // Preflight responses match the origin check done in handlers
    let cors = if state.allowed_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/mcp", post(handle_post))
        .route("/health", get(handle_health))
        .route(&format!("{}/search/raw", API_PREFIX), get(handle_raw_search))
        .route(&format!("{}/search/fulltext", API_PREFIX), get(handle_fulltext_search))
        .route(
            &format!("{}/search/relationships/:guid", API_PREFIX),
            get(handle_relationship_search),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    api_key: String,
    allowed_origins: Vec<String>,
    authless: bool,
}

impl AppState {
    fn guard(&self, headers: &HeaderMap) -> std::result::Result<(), Response> {
        if self.authless {
            return Ok(());
        }
        validate_auth(headers, &self.api_key)?;
        validate_origin(headers, &self.allowed_origins)
    }

    fn default_depth(&self) -> i32 {
        self.server.traversal().default_depth
    }
}

/// Every successful REST response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T: Serialize> {
    request_id: String,
    timestamp: String,
    count: usize,
    results: T,
}

fn envelope<T: Serialize>(count: usize, results: T) -> Response {
    let body = Envelope {
        request_id: Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        count,
        results,
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::QueryExecution => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &MetagraphError) -> Response {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        log::error!("Discovery request failed: {}", err);
    }
    (
        status,
        Json(json!({
            "error": err.to_string(),
            "kind": kind.as_str(),
        })),
    )
        .into_response()
}

/// Optional integer query parameter; present but unparseable is a 400
fn parse_depth(raw: Option<&str>, default: i32) -> Result<i32> {
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|_| {
            MetagraphError::InvalidArgument(format!("\"depth\" must be an integer, got {:?}", s))
        }),
    }
}

#[derive(Debug, Deserialize)]
struct RawSearchParams {
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FulltextSearchParams {
    text: Option<String>,
    property: Option<String>,
    depth: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelationshipSearchParams {
    #[serde(rename = "edgesToFollow")]
    edges_to_follow: Option<String>,
    depth: Option<String>,
}

async fn handle_raw_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RawSearchParams>,
) -> Response {
    if let Err(response) = state.guard(&headers) {
        return response;
    }
    match state.server.discovery().run_raw_query(params.query.as_deref()).await {
        Ok(rows) => envelope(rows.len(), rows),
        Err(e) => error_response(&e),
    }
}

async fn handle_fulltext_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<FulltextSearchParams>,
) -> Response {
    if let Err(response) = state.guard(&headers) {
        return response;
    }
    let depth = match parse_depth(params.depth.as_deref(), state.default_depth()) {
        Ok(d) => d,
        Err(e) => return error_response(&e),
    };
    match state
        .server
        .discovery()
        .find_by_property(params.text.as_deref(), depth, params.property.as_deref())
        .await
    {
        Ok(result) => envelope(result.len(), result),
        Err(e) => error_response(&e),
    }
}

async fn handle_relationship_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(guid): Path<String>,
    Query(params): Query<RelationshipSearchParams>,
) -> Response {
    if let Err(response) = state.guard(&headers) {
        return response;
    }
    let depth = match parse_depth(params.depth.as_deref(), state.default_depth()) {
        Ok(d) => d,
        Err(e) => return error_response(&e),
    };
    match state
        .server
        .discovery()
        .walk_relationships(Some(&guid), depth, params.edges_to_follow.as_deref())
        .await
    {
        Ok(result) => envelope(result.len(), result),
        Err(e) => error_response(&e),
    }
}

/// JSON-RPC over a single POST; the response is returned in the body
async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if let Err(response) = state.guard(&headers) {
        return response;
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let response = JsonRpcResponse::error(
                serde_json::Value::Null,
                error_codes::PARSE_ERROR,
                format!("Parse error: {}", e),
                None,
            );
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    // Each HTTP request stands alone
    let mut initialized = false;
    let method = request.method.clone();

    match state.server.process_mcp_request(request, &mut initialized).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) if method == "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            log::error!("Error processing MCP request: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error",
                    "kind": e.kind().as_str(),
                })),
            )
                .into_response()
        }
    }
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "metagraph",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let unauthorized = |error: &str| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": error,
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response()
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let provided_key = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid Authorization header format"))?;

    if provided_key != expected_key {
        return Err(unauthorized("Invalid API key"));
    }
    Ok(())
}

/// Validate Origin header (prevents DNS rebinding attacks)
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // No Origin header: not a browser request
    let origin = match headers.get("origin").and_then(|h| h.to_str().ok()) {
        Some(o) => o,
        None => return Ok(()),
    };

    if allowed_origins
        .iter()
        .any(|allowed| origin == allowed || origin.starts_with(&format!("{}://", allowed)))
    {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRepository;
    use crate::test_support::seeded_db;
    use axum::http::HeaderValue;
    use serde_json::Value;
    use tempfile::TempDir;

    async fn state(api_key: &str, authless: bool) -> (AppState, TempDir) {
        let (db, temp) = seeded_db().await;
        let discovery = DiscoveryService::new(Arc::new(SqliteRepository::new(db)));
        let state = AppState {
            server: Arc::new(McpServer::new(discovery, TraversalConfig::default())),
            api_key: api_key.to_string(),
            allowed_origins: vec![],
            authless,
        };
        (state, temp)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn bearer(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(&format!("Bearer {}", key)).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_raw_search_envelope() {
        let (state, _temp) = state("", true).await;
        let response = handle_raw_search(
            State(state),
            HeaderMap::new(),
            Query(RawSearchParams {
                query: Some("SELECT guid FROM entities WHERE type_name = 'hive_column' ORDER BY guid".into()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["results"][0]["guid"], "c1");
        assert!(body["requestId"].as_str().unwrap().len() == 36);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_fulltext_defaults_depth() {
        let (state, _temp) = state("", true).await;
        let response = handle_fulltext_search(
            State(state),
            HeaderMap::new(),
            Query(FulltextSearchParams {
                text: Some("customer".into()),
                property: Some("name".into()),
                depth: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // sales_customers and customer_id
        assert_eq!(body["count"], 2);
        assert_eq!(body["results"]["c2"]["t2"]["name"], "sales_customers");
    }

    #[tokio::test]
    async fn test_status_codes_follow_error_kind() {
        let (state, _temp) = state("", true).await;

        let missing_prop = handle_fulltext_search(
            State(state.clone()),
            HeaderMap::new(),
            Query(FulltextSearchParams {
                text: Some("x".into()),
                property: None,
                depth: Some("1".into()),
            }),
        )
        .await;
        assert_eq!(missing_prop.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(missing_prop).await["kind"], "InvalidArgument");

        let bad_depth = handle_fulltext_search(
            State(state.clone()),
            HeaderMap::new(),
            Query(FulltextSearchParams {
                text: Some("x".into()),
                property: Some("name".into()),
                depth: Some("two".into()),
            }),
        )
        .await;
        assert_eq!(bad_depth.status(), StatusCode::BAD_REQUEST);

        let not_found = handle_relationship_search(
            State(state.clone()),
            HeaderMap::new(),
            Path("ghost".to_string()),
            Query(RelationshipSearchParams {
                edges_to_follow: Some("in_db".into()),
                depth: None,
            }),
        )
        .await;
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let bad_query = handle_raw_search(
            State(state),
            HeaderMap::new(),
            Query(RawSearchParams {
                query: Some("DELETE FROM entities".into()),
            }),
        )
        .await;
        assert_eq!(bad_query.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(bad_query).await["kind"], "QueryExecutionError");
    }

    #[tokio::test]
    async fn test_relationship_search_walks_from_path_guid() {
        let (state, _temp) = state("secret", false).await;
        let response = handle_relationship_search(
            State(state),
            bearer("secret"),
            Path("t1".to_string()),
            Query(RelationshipSearchParams {
                edges_to_follow: Some("has_column".into()),
                depth: Some("3".into()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"]["t1"]["c2"]["type"], "bigint");
    }

    #[tokio::test]
    async fn test_auth_required_unless_authless() {
        let (state, _temp) = state("secret", false).await;
        let params = || {
            Query(RawSearchParams {
                query: Some("SELECT 1 AS one".into()),
            })
        };

        let response = handle_raw_search(State(state.clone()), HeaderMap::new(), params()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = handle_raw_search(State(state.clone()), bearer("wrong"), params()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = handle_raw_search(State(state), bearer("secret"), params()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["results"][0]["one"], "1");
    }

    #[test]
    fn test_validate_origin() {
        let allowed = vec!["https://app.example.com".to_string()];
        let mut headers = HeaderMap::new();
        assert!(validate_origin(&headers, &allowed).is_ok());

        headers.insert("origin", HeaderValue::from_static("https://app.example.com"));
        assert!(validate_origin(&headers, &allowed).is_ok());

        headers.insert("origin", HeaderValue::from_static("https://evil.example.com"));
        let response = validate_origin(&headers, &allowed).unwrap_err();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_post_mcp_roundtrip() {
        let (state, _temp) = state("", true).await;
        let body = axum::body::Bytes::from(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#.as_bytes().to_vec(),
        );
        let response = handle_post(State(state.clone()), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["result"]["tools"][0]["name"], "metagraph_raw_query");

        let garbage = axum::body::Bytes::from_static(b"not json");
        let response = handle_post(State(state), HeaderMap::new(), garbage).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let body = body_json(handle_health().await).await;
        assert_eq!(body["service"], "metagraph");
    }
}
