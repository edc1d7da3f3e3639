use anyhow::{Context, Result};
use clap::Parser;
use metagraph::db::{migrate, Db};
use metagraph::graph::GraphDocument;
use metagraph::{Config, SqliteRepository};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "load")]
#[command(about = "Load entities and relationships from JSON/YAML graph documents into the Metagraph store")]
struct Args {
    /// Graph documents to load (.json, .yaml, .yml), each in its own transaction
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Parse and validate the documents without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.metagraph.log_level),
    )
    .init();

    let start = Instant::now();
    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let document = GraphDocument::from_path(path)
            .with_context(|| format!("Failed to read graph document {}", path.display()))?;
        log::info!(
            "{}: {} entities, {} relationships",
            path.display(),
            document.entities.len(),
            document.relationships.len()
        );
        documents.push((path, document));
    }

    if args.dry_run {
        for (path, document) in documents {
            document
                .into_parts()
                .with_context(|| format!("Invalid graph document {}", path.display()))?;
        }
        log::info!("Dry run: all documents valid");
        return Ok(());
    }

    let db = Db::new(config.db_path());
    let migrations_dir = config.migrations_dir().to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await?;
    let repository = SqliteRepository::with_traversal(db, config.traversal.clone());

    let mut entities = 0;
    let mut relationships = 0;
    for (path, document) in documents {
        let summary = repository
            .import(document)
            .await
            .with_context(|| format!("Failed to load {}", path.display()))?;
        entities += summary.entities;
        relationships += summary.relationships;
    }

    log::info!(
        "Loaded {} entities and {} relationships from {} file(s) in {:.2}s",
        entities,
        relationships,
        args.files.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
