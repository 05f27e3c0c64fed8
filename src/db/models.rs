//! Persisted entities shared by both store backends.

use chrono::{DateTime, Utc};

/// A stored message that can be replayed into a channel.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub content: String,
    /// Unix nanoseconds.
    pub created_at: i64,
    /// Unix nanoseconds.
    pub updated_at: i64,
}

impl Message {
    pub fn created_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.created_at)
    }
}

/// One replay of a message into a channel.
///
/// Append-only. The `id` doubles as the insertion index and breaks ties
/// between rows with the same `sent_at`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MessageHistory {
    pub id: i64,
    pub message_id: i64,
    pub channel_id: String,
    /// Unix nanoseconds.
    pub sent_at: i64,
}

impl MessageHistory {
    pub fn sent_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.sent_at)
    }
}

/// Row counts of both tables in one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub messages: i64,
    pub history: i64,
}

impl RowCounts {
    pub const fn new(messages: i64, history: i64) -> Self {
        Self { messages, history }
    }

    pub fn is_empty(&self) -> bool {
        self.messages == 0 && self.history == 0
    }
}

impl std::fmt::Display for RowCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} messages / {} history", self.messages, self.history)
    }
}

/// Current time as Unix nanoseconds.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
