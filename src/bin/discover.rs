use anyhow::Result;
use clap::{Parser, Subcommand};
use metagraph::{Config, DiscoveryService, SqliteRepository};
use metagraph::db::Db;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "discover")]
#[command(about = "Query the Metagraph store from the command line; prints JSON")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a query uninterpreted against the store
    Raw {
        query: String,
    },
    /// Substring match on an entity property, then expand neighborhoods
    Text {
        text: String,

        #[arg(short, long, default_value = "name")]
        property: String,

        /// Defaults to traversal.default_depth
        #[arg(short, long, allow_hyphen_values = true)]
        depth: Option<i32>,
    },
    /// Walk from one entity along the listed relationship types
    Walk {
        guid: String,

        /// Comma-separated relationship types
        #[arg(short, long)]
        edges: String,

        #[arg(short, long, allow_hyphen_values = true)]
        depth: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.metagraph.log_level),
    )
    .init();

    // Read-only: no migrations, a missing store is an error
    let db = Db::new(config.db_path());
    let repository = SqliteRepository::with_traversal(db, config.traversal.clone());
    let discovery = DiscoveryService::new(Arc::new(repository));
    let default_depth = config.traversal.default_depth;

    let output = match args.command {
        Command::Raw { query } => {
            serde_json::to_value(discovery.run_raw_query(Some(&query)).await?)?
        }
        Command::Text { text, property, depth } => {
            let result = discovery
                .find_by_property(Some(&text), depth.unwrap_or(default_depth), Some(&property))
                .await?;
            serde_json::to_value(result)?
        }
        Command::Walk { guid, edges, depth } => {
            let result = discovery
                .walk_relationships(Some(&guid), depth.unwrap_or(default_depth), Some(&edges))
                .await?;
            serde_json::to_value(result)?
        }
    };

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);
    Ok(())
}
