//! Default value functions for configuration.

use std::net::SocketAddr;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "eo-bot.sqlite".to_string()
}

/// Primary path used when running on Fly.io, where `/data` is the mounted volume.
pub fn default_fly_database_path() -> String {
    "/data/eo-bot.sqlite".to_string()
}

pub fn default_migration_batch_size() -> usize {
    crate::db::DEFAULT_BATCH_SIZE
}

// =============================================================================
// Selector Defaults
// =============================================================================

pub fn default_recent_window() -> u32 {
    crate::db::DEFAULT_RECENT_WINDOW
}

// =============================================================================
// HTTP Defaults
// =============================================================================

pub fn default_http_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

// =============================================================================
// Crawl Defaults
// =============================================================================

pub fn default_crawl_author() -> String {
    "EO Bot".to_string()
}

pub fn default_crawl_page_size() -> u32 {
    100
}

pub fn default_crawl_page_delay_ms() -> u64 {
    500
}
