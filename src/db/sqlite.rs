//! File-backed SQLite store (the primary).
//!
//! Opened with foreign keys on, a bounded busy timeout and WAL journaling so
//! concurrent readers and writers contend on SQLite's own locks and give up
//! after a few seconds instead of waiting forever.

use super::models::{Message, MessageHistory, now_nanos};
use super::store::MessageStore;
use super::{DbError, map_insert_error};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite-backed message store.
pub struct SqliteStore {
    pool: SqlitePool,
    location: Location,
}

impl SqliteStore {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// How long a statement waits on a locked database before failing with SQLITE_BUSY.
    const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Open (creating if missing) the store at `path`, probe it, and apply the schema.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, DbError> {
        if path.trim().is_empty() {
            return Err(DbError::Config("sqlite path is required".to_string()));
        }
        let location = if path == ":memory:" {
            Location::Memory
        } else {
            Location::File(PathBuf::from(path))
        };
        Self::open_location(location).await
    }

    async fn open_location(location: Location) -> Result<Self, DbError> {
        let pool = Self::connect(&location).await?;
        let store = Self { pool, location };

        store.ping().await.map_err(|e| DbError::Connection(e.to_string()))?;
        info!(path = %store.describe(), "SQLite connected");

        store.apply_schema().await?;
        store.check_integrity().await?;
        Ok(store)
    }

    async fn connect(location: &Location) -> Result<SqlitePool, DbError> {
        let pool = match location {
            Location::Memory => {
                // Uniquely named shared-cache memory database per call.
                // `file::memory:` is global-ish and will collide across parallel tests.
                let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
                let memdb_uri = format!(
                    "file:eobot-memdb-{}-{}?mode=memory&cache=shared",
                    std::process::id(),
                    id
                );

                let options = SqliteConnectOptions::new()
                    .filename(&memdb_uri)
                    .shared_cache(true)
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .busy_timeout(Self::BUSY_TIMEOUT);

                // The database lives only as long as one connection stays open.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                    .idle_timeout(Some(Self::IDLE_TIMEOUT))
                    .test_before_acquire(true)
                    .connect_with(options)
                    .await
            }
            Location::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DbError::Config(format!(
                            "cannot create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }

                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .busy_timeout(Self::BUSY_TIMEOUT)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal);

                SqlitePoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                    .idle_timeout(Some(Self::IDLE_TIMEOUT))
                    .test_before_acquire(true)
                    .connect_with(options)
                    .await
            }
        };
        pool.map_err(|e| DbError::Connection(e.to_string()))
    }

    async fn apply_schema(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;

        // Tables that predate the migrations must still expose the columns we read.
        for probe in [
            "SELECT id, content, created_at, updated_at FROM messages LIMIT 0",
            "SELECT id, message_id, channel_id, sent_at FROM message_history LIMIT 0",
        ] {
            sqlx::query(probe)
                .execute(&self.pool)
                .await
                .map_err(|e| DbError::Schema(format!("incompatible schema: {e}")))?;
        }

        info!(path = %self.describe(), "SQLite schema checked/applied");
        Ok(())
    }

    async fn check_integrity(&self) -> Result<(), DbError> {
        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Schema(format!(
                "integrity check failed: {integrity_result}"
            )));
        }
        Ok(())
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Backing file, if the store is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    /// Close the store, delete its backing files and open it again empty.
    pub(super) async fn recreate(&mut self) -> Result<(), DbError> {
        self.pool.close().await;

        if let Location::File(path) = &self.location {
            for file in store_files(path) {
                match std::fs::remove_file(&file) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(
                            path = %file.display(),
                            error = %e,
                            "Failed to remove SQLite file for recreation"
                        );
                        return Err(DbError::Io(e));
                    }
                }
            }
        }

        *self = Self::open_location(self.location.clone()).await?;
        info!(path = %self.describe(), "SQLite store recreated");
        Ok(())
    }

    /// Structural copy of rows into this store, keeping ids and timestamps.
    ///
    /// Each batch becomes one multi-row INSERT; all batches share one
    /// transaction, so a failed copy leaves nothing behind.
    pub(super) async fn copy_rows(
        &self,
        messages: &[Message],
        history: &[MessageHistory],
        batch_size: usize,
    ) -> Result<(), DbError> {
        let batch_size = batch_size.max(1);
        let mut tx = self.pool.begin().await?;

        for chunk in messages.chunks(batch_size) {
            let mut qb: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("INSERT INTO messages (id, content, created_at, updated_at) ");
            qb.push_values(chunk, |mut row, m| {
                row.push_bind(m.id)
                    .push_bind(m.content.as_str())
                    .push_bind(m.created_at)
                    .push_bind(m.updated_at);
            });
            qb.build().execute(&mut *tx).await?;
        }

        for chunk in history.chunks(batch_size) {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO message_history (id, message_id, channel_id, sent_at) ",
            );
            qb.push_values(chunk, |mut row, h| {
                row.push_bind(h.id)
                    .push_bind(h.message_id)
                    .push_bind(h.channel_id.as_str())
                    .push_bind(h.sent_at);
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Write a consistent snapshot of the database to `dest` with `VACUUM INTO`.
    ///
    /// `dest` must not exist or be an empty file.
    pub async fn backup_into(&self, dest: &Path) -> Result<(), DbError> {
        sqlx::query("VACUUM INTO ?")
            .bind(dest.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// The database file plus its WAL and shared-memory companions.
fn store_files(path: &Path) -> [PathBuf; 3] {
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    let mut shm = path.as_os_str().to_owned();
    shm.push("-shm");
    [path.to_path_buf(), PathBuf::from(wal), PathBuf::from(shm)]
}

#[async_trait]
impl MessageStore for SqliteStore {
    fn describe(&self) -> String {
        match &self.location {
            Location::File(path) => format!("sqlite:{}", path.display()),
            Location::Memory => "sqlite::memory:".to_string(),
        }
    }

    fn is_healthy(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn ping(&self) -> Result<(), DbError> {
        match tokio::time::timeout(Self::PROBE_TIMEOUT, sqlx::query("SELECT 1").execute(&self.pool))
            .await
        {
            Ok(result) => result.map(|_| ()).map_err(DbError::from),
            Err(_) => Err(DbError::Transient("sqlite ping timed out".to_string())),
        }
    }

    async fn count_messages(&self) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_history(&self) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM message_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_message(&self, content: &str) -> Result<Message, DbError> {
        let now = now_nanos();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (content, created_at, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, content))?;

        Ok(Message {
            id: result.last_insert_rowid(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn recent_message_ids(&self, channel_id: &str, limit: u32) -> Result<Vec<i64>, DbError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT message_id FROM message_history
            WHERE channel_id = ?
            ORDER BY sent_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(channel_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn select_random_excluding(&self, excluded: &[i64]) -> Result<Option<Message>, DbError> {
        let mut query =
            String::from("SELECT id, content, created_at, updated_at FROM messages");

        if !excluded.is_empty() {
            query.push_str(" WHERE id NOT IN (");
            for (i, _) in excluded.iter().enumerate() {
                if i > 0 {
                    query.push_str(", ");
                }
                query.push('?');
            }
            query.push(')');
        }
        query.push_str(" ORDER BY RANDOM() LIMIT 1");

        let mut q = sqlx::query_as::<_, Message>(&query);
        for id in excluded {
            q = q.bind(*id);
        }

        Ok(q.fetch_optional(&self.pool).await?)
    }

    async fn insert_history(
        &self,
        message_id: i64,
        channel_id: &str,
    ) -> Result<MessageHistory, DbError> {
        let sent_at = now_nanos();
        let result = sqlx::query(
            r#"
            INSERT INTO message_history (message_id, channel_id, sent_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(message_id)
        .bind(channel_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        Ok(MessageHistory {
            id: result.last_insert_rowid(),
            message_id,
            channel_id: channel_id.to_string(),
            sent_at,
        })
    }

    async fn messages_after(&self, after_id: i64, limit: u32) -> Result<Vec<Message>, DbError> {
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, content, created_at, updated_at FROM messages
            WHERE id > ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn history_after(
        &self,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<MessageHistory>, DbError> {
        let rows = sqlx::query_as::<_, MessageHistory>(
            r#"
            SELECT id, message_id, channel_id, sent_at FROM message_history
            WHERE id > ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn close(&self) -> Result<(), DbError> {
        if self.pool.is_closed() {
            return Ok(());
        }

        let checkpoint = match self.location {
            Location::File(_) => sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(DbError::from),
            Location::Memory => Ok(()),
        };

        self.pool.close().await;
        checkpoint
    }
}
