//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Primary and secondary store settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Anti-repeat selector settings.
    #[serde(default)]
    pub selector: SelectorConfig,
    /// Backup download endpoint.
    #[serde(default)]
    pub http: HttpConfig,
    /// Channel history import.
    #[serde(default)]
    pub crawl: CrawlConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the primary SQLite database file (`:memory:` for an in-memory store).
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Optional secondary store URL (`postgres://...` or `sqlite:path`).
    #[serde(default)]
    pub secondary_url: Option<String>,
    /// Rows per page when copying the secondary into an empty primary.
    #[serde(default = "default_migration_batch_size")]
    pub migration_batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            secondary_url: None,
            migration_batch_size: default_migration_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// How many recent sends per channel are excluded from the random pick.
    #[serde(default = "default_recent_window")]
    pub recent_window: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            recent_window: default_recent_window(),
        }
    }
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_http_listen(),
        }
    }
}

/// History import configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Display name of the bot account whose messages are imported.
    #[serde(default = "default_crawl_author")]
    pub author_name: String,
    #[serde(default = "default_crawl_page_size")]
    pub page_size: u32,
    /// Pause between history pages, in milliseconds.
    #[serde(default = "default_crawl_page_delay_ms")]
    pub page_delay_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            author_name: default_crawl_author(),
            page_size: default_crawl_page_size(),
            page_delay_ms: default_crawl_page_delay_ms(),
        }
    }
}
