//! One-time copy of the secondary store into an empty primary.
//!
//! Runs during startup, before any request traffic. The copy is structural:
//! ids and timestamps are preserved. After the copy both tables are
//! re-counted; on a mismatch (or a failed insert) the primary is deleted,
//! recreated and the copy retried exactly once.
//!
//! The primary requires unique content but a secondary may not. Repeated
//! content is merged into its oldest message before the copy.

use super::models::{Message, MessageHistory, RowCounts};
use super::sqlite::SqliteStore;
use super::store::MessageStore;
use super::DbError;
use std::collections::HashMap;
use tracing::{info, warn};

/// Rows per read page and per multi-row INSERT.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// What a migration run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationReport {
    /// No secondary store is configured.
    NoSecondary,
    /// The primary already holds messages; nothing was copied.
    PrimaryPopulated { messages: i64 },
    /// The secondary holds no rows.
    SourceEmpty,
    /// Rows were copied and verified.
    Copied(RowCounts),
}

pub(super) async fn run(
    primary: &mut SqliteStore,
    secondary: &dyn MessageStore,
    batch_size: usize,
) -> Result<MigrationReport, DbError> {
    let existing = primary.count_messages().await?;
    if existing > 0 {
        info!(messages = existing, "Primary store already contains data; skipping migration");
        return Ok(MigrationReport::PrimaryPopulated { messages: existing });
    }

    let expected = secondary.row_counts().await?;
    if expected.is_empty() {
        info!(
            secondary = %secondary.describe(),
            "Secondary store is also empty; nothing to migrate"
        );
        return Ok(MigrationReport::SourceEmpty);
    }

    info!(
        messages = expected.messages,
        history = expected.history,
        secondary = %secondary.describe(),
        "Primary store empty; migrating from secondary"
    );

    let page = u32::try_from(batch_size.max(1)).unwrap_or(u32::MAX);
    let messages = read_messages(secondary, page).await?;
    let mut history = read_history(secondary, page).await?;

    let (messages, merged) = merge_duplicates(messages, &mut history);
    if merged > 0 {
        warn!(merged, "Secondary store holds repeated content; keeping the oldest copy of each");
    }
    let expected = RowCounts::new(expected.messages - merged as i64, expected.history);

    match attempt(primary, &messages, &history, batch_size, expected).await {
        Ok(()) => {}
        Err(first) => {
            warn!(
                error = %first,
                "Migration attempt failed; recreating primary store and retrying"
            );
            primary.recreate().await?;
            attempt(primary, &messages, &history, batch_size, expected).await?;
        }
    }

    info!(
        messages = expected.messages,
        history = expected.history,
        "Migration from secondary completed successfully"
    );
    Ok(MigrationReport::Copied(expected))
}

/// Drop messages whose content repeats an earlier one and point their history
/// at the kept message. `messages` must be in id order; the lowest id wins.
///
/// Returns the kept messages and how many were merged away.
fn merge_duplicates(
    messages: Vec<Message>,
    history: &mut [MessageHistory],
) -> (Vec<Message>, usize) {
    let mut first_id: HashMap<String, i64> = HashMap::with_capacity(messages.len());
    let mut remap: HashMap<i64, i64> = HashMap::new();
    let mut kept = Vec::with_capacity(messages.len());

    for message in messages {
        match first_id.get(&message.content) {
            Some(&id) => {
                remap.insert(message.id, id);
            }
            None => {
                first_id.insert(message.content.clone(), message.id);
                kept.push(message);
            }
        }
    }

    for row in history.iter_mut() {
        if let Some(&id) = remap.get(&row.message_id) {
            row.message_id = id;
        }
    }
    (kept, remap.len())
}

/// Insert every row, then compare the primary's counts with `expected`.
async fn attempt(
    primary: &SqliteStore,
    messages: &[Message],
    history: &[MessageHistory],
    batch_size: usize,
    expected: RowCounts,
) -> Result<(), DbError> {
    primary.copy_rows(messages, history, batch_size).await?;
    let actual = primary.row_counts().await?;
    verify_counts(expected, actual)
}

fn verify_counts(expected: RowCounts, actual: RowCounts) -> Result<(), DbError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DbError::MigrationIntegrity { expected, actual })
    }
}

async fn read_messages(source: &dyn MessageStore, page: u32) -> Result<Vec<Message>, DbError> {
    let mut rows = Vec::new();
    let mut after = i64::MIN;
    loop {
        let batch = source.messages_after(after, page).await?;
        let Some(last) = batch.last() else { break };
        after = last.id;
        let done = batch.len() < page as usize;
        rows.extend(batch);
        if done {
            break;
        }
    }
    Ok(rows)
}

async fn read_history(
    source: &dyn MessageStore,
    page: u32,
) -> Result<Vec<MessageHistory>, DbError> {
    let mut rows = Vec::new();
    let mut after = i64::MIN;
    loop {
        let batch = source.history_after(after, page).await?;
        let Some(last) = batch.last() else { break };
        after = last.id;
        let done = batch.len() < page as usize;
        rows.extend(batch);
        if done {
            break;
        }
    }
    Ok(rows)
}
