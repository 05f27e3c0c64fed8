//! Backend-neutral store interface.

use super::DbError;
use super::models::{Message, MessageHistory, RowCounts};
use async_trait::async_trait;
use std::path::PathBuf;

/// Parsed secondary store address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    Sqlite(PathBuf),
    Postgres(String),
}

impl StoreUrl {
    pub fn parse(raw: &str) -> Result<Self, DbError> {
        let raw = raw.trim();
        if raw.starts_with("postgres://") || raw.starts_with("postgresql://") {
            return Ok(Self::Postgres(raw.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("sqlite:") {
            let path = rest.trim_start_matches("//").trim();
            if path.is_empty() {
                return Err(DbError::Config(format!("sqlite URL missing path: {raw}")));
            }
            return Ok(Self::Sqlite(PathBuf::from(path)));
        }
        Err(DbError::Config(format!("unsupported store URL scheme: {}", redact(raw))))
    }
}

/// Strip credentials from a connection URL before it reaches a log line.
pub fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// Operations the router and the migration engine need from a store.
///
/// Implemented by the SQLite primary and by every secondary backend. All
/// timestamps are Unix nanoseconds.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Human-readable location for logs (no credentials).
    fn describe(&self) -> String;

    /// Non-blocking liveness check: false once the handle is closed.
    fn is_healthy(&self) -> bool;

    /// Round-trip liveness probe, bounded by a short timeout.
    async fn ping(&self) -> Result<(), DbError>;

    async fn count_messages(&self) -> Result<i64, DbError>;

    async fn count_history(&self) -> Result<i64, DbError>;

    async fn row_counts(&self) -> Result<RowCounts, DbError> {
        Ok(RowCounts {
            messages: self.count_messages().await?,
            history: self.count_history().await?,
        })
    }

    /// Insert a message. A unique-constraint hit maps to `DbError::Duplicate`.
    async fn insert_message(&self, content: &str) -> Result<Message, DbError>;

    /// Message ids most recently replayed into `channel_id`, newest first.
    async fn recent_message_ids(&self, channel_id: &str, limit: u32) -> Result<Vec<i64>, DbError>;

    /// Uniformly random message whose id is not in `excluded`.
    async fn select_random_excluding(&self, excluded: &[i64]) -> Result<Option<Message>, DbError>;

    async fn insert_history(&self, message_id: i64, channel_id: &str)
    -> Result<MessageHistory, DbError>;

    /// Keyset page of messages with `id > after_id`, ascending.
    async fn messages_after(&self, after_id: i64, limit: u32) -> Result<Vec<Message>, DbError>;

    /// Keyset page of history rows with `id > after_id`, ascending.
    async fn history_after(&self, after_id: i64, limit: u32)
    -> Result<Vec<MessageHistory>, DbError>;

    async fn close(&self) -> Result<(), DbError>;
}
