use anyhow::Result;
use metagraph::db::{migrate, Db};
use metagraph::mcp::{HttpMcpServer, McpServer};
use metagraph::{Config, DiscoveryService, MetagraphError, SqliteRepository};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Logs go to stderr; stdout carries the stdio MCP stream
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.metagraph.log_level),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_mcp_server(config).await?,
        "serve-http" => run_http_server(config).await?,
        _ => run_schema_verification(config).await?,
    }

    Ok(())
}

/// Open the store and bring its schema up to date
async fn open_store(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    let migrations_dir = config.migrations_dir().to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await?;
    log::info!("Graph store ready at {}", db.path().display());
    Ok(db)
}

fn discovery_service(db: Db, config: &Config) -> DiscoveryService {
    let repository = SqliteRepository::with_traversal(db, config.traversal.clone());
    DiscoveryService::new(Arc::new(repository))
}

/// Run MCP server (stdio transport)
async fn run_mcp_server(config: Config) -> Result<()> {
    let db = open_store(&config).await?;
    let server = McpServer::new(discovery_service(db, &config), config.traversal.clone());
    server.run().await?;
    Ok(())
}

/// Run HTTP server (MCP over POST plus REST discovery routes)
async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting Metagraph HTTP server v{}", env!("CARGO_PKG_VERSION"));
    let db = open_store(&config).await?;
    let http_server = HttpMcpServer::new(
        discovery_service(db, &config),
        config.traversal.clone(),
        &config.http_server,
    )?;
    http_server.run(config.http_server.port).await?;
    Ok(())
}

/// Migrate, then check that the graph schema is complete and healthy
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting Metagraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Migrations: {}", config.migrations_dir().display());

    let db = open_store(&config).await?;
    verify_database_schema(&db).await?;

    log::info!("Database schema verification complete");
    Ok(())
}

async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let missing = migrate::missing_graph_tables(conn)?;
        if !missing.is_empty() {
            for table in &missing {
                log::error!("Missing table: {}", table);
            }
            return Err(MetagraphError::Config(format!(
                "Graph schema incomplete, missing: {}",
                missing.join(", ")
            )));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::info!("{} migrations applied: {}", applied.len(), applied.join(", "));

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(MetagraphError::Config("Foreign keys not enabled".to_string()));
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            log::warn!("Journal mode is {}, expected WAL", journal_mode);
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(MetagraphError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }

        let (entities, relationships): (i64, i64) = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM entities), (SELECT COUNT(*) FROM relationships)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        log::info!("Store holds {} entities and {} relationships", entities, relationships);
        Ok(())
    })
    .await?;
    Ok(())
}
