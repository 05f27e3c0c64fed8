//! End-to-end tests for the dual-store core through the public API.
//!
//! The secondary is a second SQLite file addressed with a `sqlite:` URL so
//! the tests need no external database.

use eobot::db::{
    DbError, Message, MessageHistory, MessageStore, SqliteStore, StorePair, StoreRole,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Paths {
    _dir: TempDir,
    primary: PathBuf,
    secondary: PathBuf,
}

impl Paths {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            primary: dir.path().join("data").join("primary.sqlite"),
            secondary: dir.path().join("secondary.sqlite"),
            _dir: dir,
        }
    }

    fn primary(&self) -> &str {
        self.primary.to_str().unwrap()
    }

    fn secondary_url(&self) -> String {
        format!("sqlite://{}", self.secondary.display())
    }
}

/// Seed `path` with `count` messages, each sent once to channel `X`.
async fn seed(path: &Path, count: usize) {
    let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();
    for i in 0..count {
        let m = store.insert_message(&format!("quote {i}")).await.unwrap();
        store.insert_history(m.id, "X").await.unwrap();
    }
    store.close().await.unwrap();
}

async fn all_rows(store: &dyn MessageStore) -> (Vec<Message>, Vec<MessageHistory>) {
    let messages = store.messages_after(i64::MIN, 10_000).await.unwrap();
    let history = store.history_after(i64::MIN, 10_000).await.unwrap();
    (messages, history)
}

#[tokio::test]
async fn migration_copies_secondary_into_empty_primary() {
    let paths = Paths::new();
    seed(&paths.secondary, 250).await;

    let url = paths.secondary_url();
    let pair = StorePair::open_with(paths.primary(), Some(&url), 40).await.unwrap();

    let secondary = pair.secondary().expect("secondary should be open");
    let (src_messages, src_history) = all_rows(secondary).await;
    let (dst_messages, dst_history) = all_rows(pair.primary()).await;

    assert_eq!(dst_messages.len(), 250);
    assert_eq!(dst_history.len(), 250);
    assert_eq!(dst_messages, src_messages);
    assert_eq!(dst_history, src_history);

    pair.close().await.unwrap();
}

#[tokio::test]
async fn reopening_does_not_copy_again() {
    let paths = Paths::new();
    seed(&paths.secondary, 3).await;
    let url = paths.secondary_url();

    let pair = StorePair::open(paths.primary(), Some(&url)).await.unwrap();
    pair.messages().create_message("primary only").await.unwrap();
    pair.close().await.unwrap();

    let pair = StorePair::open(paths.primary(), Some(&url)).await.unwrap();
    assert_eq!(pair.primary().count_messages().await.unwrap(), 4);
    assert_eq!(pair.secondary().unwrap().count_messages().await.unwrap(), 3);
    pair.close().await.unwrap();
}

#[tokio::test]
async fn empty_secondary_leaves_primary_empty() {
    let paths = Paths::new();
    seed(&paths.secondary, 0).await;
    let url = paths.secondary_url();

    let pair = StorePair::open(paths.primary(), Some(&url)).await.unwrap();
    assert_eq!(pair.primary().count_messages().await.unwrap(), 0);
    let err = pair.messages().fetch_random("X").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
    pair.close().await.unwrap();
}

#[tokio::test]
async fn unavailable_primary_routes_to_secondary() {
    let paths = Paths::new();
    seed(&paths.secondary, 2).await;
    let url = paths.secondary_url();

    let pair = StorePair::open(paths.primary(), Some(&url)).await.unwrap();
    pair.primary().close().await.unwrap();
    assert_eq!(pair.route().role(), StoreRole::Secondary);

    let repo = pair.messages().with_recent_window(1);
    let first = repo.fetch_random("Y").await.unwrap();
    let second = repo.fetch_random("Y").await.unwrap();
    assert_ne!(first.id, second.id);

    let created = repo.create_message("written while primary is down").await.unwrap();
    let secondary = pair.secondary().unwrap();
    assert_eq!(secondary.count_messages().await.unwrap(), 3);
    // Seeded history in X plus the two fetches in Y.
    assert_eq!(secondary.count_history().await.unwrap(), 4);
    let stored = secondary.messages_after(created.id - 1, 1).await.unwrap();
    assert_eq!(stored, vec![created]);

    pair.close().await.unwrap();
}

#[tokio::test]
async fn primary_only_store_failure_is_returned() {
    let paths = Paths::new();
    let pair = StorePair::open(paths.primary(), None).await.unwrap();
    pair.messages().create_message("a").await.unwrap();
    pair.primary().close().await.unwrap();

    let err = pair.messages().fetch_random("X").await.unwrap_err();
    assert!(err.is_store_failure(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn window_never_repeats_on_file_store() {
    let paths = Paths::new();
    let pair = StorePair::open(paths.primary(), None).await.unwrap();
    for i in 0..6 {
        pair.messages().create_message(&format!("m{i}")).await.unwrap();
    }

    let repo = pair.messages().with_recent_window(5);
    let mut shown: Vec<i64> = Vec::new();
    for _ in 0..30 {
        let m = repo.fetch_random("X").await.unwrap();
        let window: HashSet<i64> = shown.iter().rev().take(5).copied().collect();
        assert!(!window.contains(&m.id), "message {} repeated inside window", m.id);
        shown.push(m.id);
    }
    pair.close().await.unwrap();
}

#[tokio::test]
async fn failed_copy_is_fatal_and_leaves_primary_empty() {
    let paths = Paths::new();
    seed(&paths.secondary, 2).await;

    // A history row pointing at a missing message cannot be copied into a
    // primary that enforces foreign keys.
    {
        let store = SqliteStore::open(paths.secondary.to_str().unwrap()).await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO message_history (message_id, channel_id, sent_at) VALUES (9999, 'X', 1)",
        )
        .execute(&mut *conn)
        .await
        .unwrap();
        drop(conn);
        store.close().await.unwrap();
    }

    let url = paths.secondary_url();
    let err = match StorePair::open(paths.primary(), Some(&url)).await {
        Ok(_) => panic!("open should fail when the copy cannot be completed"),
        Err(e) => e,
    };
    assert!(err.is_store_failure(), "unexpected error: {err:?}");

    let primary = SqliteStore::open(paths.primary()).await.unwrap();
    assert_eq!(primary.count_messages().await.unwrap(), 0);
    assert_eq!(primary.count_history().await.unwrap(), 0);
    primary.close().await.unwrap();
}

#[tokio::test]
async fn repeated_secondary_content_is_merged_on_copy() {
    let paths = Paths::new();

    // Same layout as the PostgreSQL schema: no uniqueness on content.
    {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&paths.secondary)
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
        sqlx::query(
            "CREATE TABLE messages (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             content TEXT NOT NULL, created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO messages (content, created_at, updated_at) \
             VALUES ('same', 1, 1), ('same', 2, 2), ('other', 3, 3)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let url = paths.secondary_url();
    let pair = StorePair::open(paths.primary(), Some(&url)).await.unwrap();

    let (messages, _) = all_rows(pair.primary()).await;
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["same", "other"]);
    assert_eq!(pair.secondary().unwrap().count_messages().await.unwrap(), 3);
    pair.close().await.unwrap();
}

#[tokio::test]
async fn stray_primary_history_is_cleared_by_retry() {
    let paths = Paths::new();
    seed(&paths.secondary, 1).await;

    // An empty primary whose history table holds a row the copy cannot explain.
    {
        let primary = SqliteStore::open(paths.primary()).await.unwrap();
        let mut conn = primary.pool().acquire().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO message_history (id, message_id, channel_id, sent_at) \
             VALUES (9999, 424242, 'X', 1)",
        )
        .execute(&mut *conn)
        .await
        .unwrap();
        drop(conn);
        primary.close().await.unwrap();
    }

    let url = paths.secondary_url();
    let pair = StorePair::open(paths.primary(), Some(&url)).await.unwrap();
    let counts = pair.primary().row_counts().await.unwrap();
    assert_eq!((counts.messages, counts.history), (1, 1));

    let (_, primary_history) = all_rows(pair.primary()).await;
    let (_, secondary_history) = all_rows(pair.secondary().unwrap()).await;
    assert_eq!(primary_history, secondary_history);
    pair.close().await.unwrap();
}
