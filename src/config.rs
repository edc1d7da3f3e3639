use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::graph::Direction;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub metagraph: MetagraphConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Store location and process-level settings
#[derive(Debug, Clone, Deserialize)]
pub struct MetagraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Repository-side traversal policy
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_text_search_direction")]
    pub text_search_direction: Direction,
    #[serde(default = "default_walk_direction")]
    pub walk_direction: Direction,
    /// Depth used by transports when a request omits it
    #[serde(default = "default_depth")]
    pub default_depth: i32,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            text_search_direction: default_text_search_direction(),
            walk_direction: default_walk_direction(),
            default_depth: default_depth(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_authless")]
    pub authless: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            port: default_http_port(),
            api_key_env: default_http_api_key_env(),
            allowed_origins: default_allowed_origins(),
            authless: default_authless(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_text_search_direction() -> Direction {
    Direction::Both
}

fn default_walk_direction() -> Direction {
    Direction::Outgoing
}

fn default_depth() -> i32 {
    1
}

fn default_authless() -> bool {
    false
}

fn default_http_enabled() -> bool {
    false
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "METAGRAPH_API_KEY".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![]
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in METAGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("METAGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.metagraph.db_path.as_os_str().is_empty() {
            anyhow::bail!("metagraph.db_path must not be empty");
        }

        if let Some(parent) = self.metagraph.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                anyhow::bail!(
                    "Directory for metagraph.db_path does not exist: {}",
                    parent.display()
                );
            }
        }

        if self.traversal.default_depth < 0 {
            anyhow::bail!("traversal.default_depth must not be negative");
        }

        if self.http_server.enabled && self.http_server.port == 0 {
            anyhow::bail!("http_server.port must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.metagraph.db_path
    }

    /// Get migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.metagraph.migrations_dir
    }
}
