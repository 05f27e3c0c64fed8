//! Message repository: saving messages and anti-repeat random replay.
//!
//! Every public operation is one logical request and runs on a single
//! [`Route`](super::Route).

use super::models::Message;
use super::{DbError, StorePair};
use tracing::{debug, warn};

/// Number of most recent replays per channel excluded from the next pick.
pub const DEFAULT_RECENT_WINDOW: u32 = 20;

/// Result of importing one message during a bulk import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Saved(Message),
    /// Content already stored.
    Skipped,
}

/// Repository for message operations.
pub struct MessageRepository<'a> {
    pair: &'a StorePair,
    recent_window: u32,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository.
    pub fn new(pair: &'a StorePair) -> Self {
        Self {
            pair,
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }

    /// Use a different recency window.
    pub fn with_recent_window(mut self, recent_window: u32) -> Self {
        self.recent_window = recent_window;
        self
    }

    /// Save a new message.
    ///
    /// Content is trimmed first. Empty content is `DbError::Validation`; content
    /// that is already stored is `DbError::Duplicate`.
    pub async fn create_message(&self, content: &str) -> Result<Message, DbError> {
        let content = validate_content(content)?;
        let mut route = self.pair.route();
        route.insert_message(content).await
    }

    /// Save a message found by a bulk import and record it as sent in `channel_id`.
    ///
    /// Duplicates are skipped rather than reported. The history row is best effort.
    pub async fn import_message(
        &self,
        content: &str,
        channel_id: &str,
    ) -> Result<ImportOutcome, DbError> {
        let content = validate_content(content)?;
        let mut route = self.pair.route();

        let message = match route.insert_message(content).await {
            Ok(message) => message,
            Err(DbError::Duplicate(_)) => return Ok(ImportOutcome::Skipped),
            Err(e) => return Err(e),
        };

        if let Err(e) = route.insert_history(message.id, channel_id).await {
            warn!(
                channel = %channel_id,
                message_id = message.id,
                store = route.role().as_str(),
                error = %e,
                "Error saving message history"
            );
        }
        Ok(ImportOutcome::Saved(message))
    }

    /// Pick a random message not among the channel's most recent replays,
    /// record the replay and return the message.
    ///
    /// When every stored message is within the recency window, the window is
    /// ignored and any message may be picked. An empty table is
    /// `DbError::NotFound`. A failure to record the replay is logged and does
    /// not fail the fetch.
    pub async fn fetch_random(&self, channel_id: &str) -> Result<Message, DbError> {
        let mut route = self.pair.route();

        let excluded = route
            .recent_message_ids(channel_id, self.recent_window)
            .await?;

        let picked = match route.select_random_excluding(&excluded).await? {
            Some(message) => message,
            None if !excluded.is_empty() => {
                debug!(
                    channel = %channel_id,
                    excluded = excluded.len(),
                    "All messages recently sent; ignoring recency window"
                );
                route
                    .select_random_excluding(&[])
                    .await?
                    .ok_or_else(|| DbError::NotFound("no messages stored".to_string()))?
            }
            None => return Err(DbError::NotFound("no messages stored".to_string())),
        };

        if let Err(e) = route.insert_history(picked.id, channel_id).await {
            warn!(
                channel = %channel_id,
                message_id = picked.id,
                store = route.role().as_str(),
                error = %e,
                "Error recording message history"
            );
        }

        Ok(picked)
    }
}

fn validate_content(content: &str) -> Result<&str, DbError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DbError::Validation("message content is empty".to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MessageStore, SqliteStore};
    use std::collections::VecDeque;

    async fn pair() -> StorePair {
        StorePair::from_parts(SqliteStore::open(":memory:").await.unwrap(), None)
    }

    #[tokio::test]
    async fn test_blank_content_is_rejected() {
        let pair = pair().await;
        for content in ["", "   ", "\n\t "] {
            let err = pair.messages().create_message(content).await.unwrap_err();
            assert!(matches!(err, DbError::Validation(_)));
        }
        assert_eq!(pair.primary().count_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_content_is_trimmed() {
        let pair = pair().await;
        let message = pair.messages().create_message("  hi there \n").await.unwrap();
        assert_eq!(message.content, "hi there");
    }

    #[tokio::test]
    async fn test_duplicate_create_is_reported() {
        let pair = pair().await;
        pair.messages().create_message("once").await.unwrap();
        let err = pair.messages().create_message(" once ").await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_duplicate_import_is_skipped() {
        let pair = pair().await;
        let first = pair.messages().import_message("crawled", "X").await.unwrap();
        assert!(matches!(first, ImportOutcome::Saved(_)));
        let second = pair.messages().import_message("crawled", "X").await.unwrap();
        assert_eq!(second, ImportOutcome::Skipped);

        assert_eq!(pair.primary().count_messages().await.unwrap(), 1);
        assert_eq!(pair.primary().count_history().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_table_is_not_found() {
        let pair = pair().await;
        let err = pair.messages().fetch_random("X").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        assert_eq!(pair.primary().count_history().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_unexcluded_message_is_returned() {
        let pair = pair().await;
        let store = pair.primary();
        let a = store.insert_message("a").await.unwrap();
        let b = store.insert_message("b").await.unwrap();
        store.insert_message("c").await.unwrap();

        // History for X, most recent first: a, b.
        store.insert_history(b.id, "X").await.unwrap();
        store.insert_history(a.id, "X").await.unwrap();

        let picked = pair
            .messages()
            .with_recent_window(2)
            .fetch_random("X")
            .await
            .unwrap();
        assert_eq!(picked.content, "c");
        assert_eq!(store.recent_message_ids("X", 1).await.unwrap(), vec![picked.id]);
    }

    #[tokio::test]
    async fn test_exhausted_window_falls_back_to_any_message() {
        let pair = pair().await;
        let store = pair.primary();
        let only = store.insert_message("only").await.unwrap();
        store.insert_history(only.id, "X").await.unwrap();

        let picked = pair.messages().fetch_random("X").await.unwrap();
        assert_eq!(picked.id, only.id);
    }

    #[tokio::test]
    async fn test_never_repeats_within_window() {
        let pair = pair().await;
        for i in 0..8 {
            pair.messages().create_message(&format!("m{i}")).await.unwrap();
        }

        let window = 5;
        let repo = pair.messages().with_recent_window(window);
        let mut recent: VecDeque<i64> = VecDeque::new();
        for _ in 0..60 {
            let picked = repo.fetch_random("X").await.unwrap();
            assert!(!recent.contains(&picked.id), "repeated {} within window", picked.id);
            recent.push_front(picked.id);
            recent.truncate(window as usize);
        }
    }

    #[tokio::test]
    async fn test_channels_have_independent_windows() {
        let pair = pair().await;
        let store = pair.primary();
        let a = store.insert_message("a").await.unwrap();
        let b = store.insert_message("b").await.unwrap();
        store.insert_history(a.id, "X").await.unwrap();
        store.insert_history(b.id, "Y").await.unwrap();

        let repo = pair.messages().with_recent_window(1);
        assert_eq!(repo.fetch_random("X").await.unwrap().id, b.id);
        assert_eq!(repo.fetch_random("Y").await.unwrap().id, a.id);
    }
}
