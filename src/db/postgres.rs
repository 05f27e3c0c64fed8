//! PostgreSQL store, used as the networked secondary.

use super::models::{Message, MessageHistory, now_nanos};
use super::store::{MessageStore, redact};
use super::{DbError, map_insert_error};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// PostgreSQL-backed message store.
pub struct PgStore {
    pool: PgPool,
    location: String,
}

impl PgStore {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
    /// Upper bound on the initial connect.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Connect, probe and apply the schema.
    pub async fn open(url: &str) -> Result<Self, DbError> {
        let location = redact(url);
        let connect = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .idle_timeout(Some(Self::IDLE_TIMEOUT))
            .test_before_acquire(true)
            .connect(url);

        let pool = match tokio::time::timeout(Self::CONNECT_TIMEOUT, connect).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => return Err(DbError::Connection(e.to_string())),
            Err(_) => {
                return Err(DbError::Connection(format!(
                    "timed out connecting to {location}"
                )));
            }
        };

        let store = Self { pool, location };
        store.ping().await.map_err(|e| DbError::Connection(e.to_string()))?;
        info!(url = %store.location, "Postgres connected");

        sqlx::migrate!("./migrations/postgres").run(&store.pool).await?;
        for probe in [
            "SELECT id, content, created_at, updated_at FROM messages LIMIT 0",
            "SELECT id, message_id, channel_id, sent_at FROM message_history LIMIT 0",
        ] {
            sqlx::query(probe)
                .execute(&store.pool)
                .await
                .map_err(|e| DbError::Schema(format!("incompatible schema: {e}")))?;
        }
        info!(url = %store.location, "Postgres schema checked/applied");

        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for PgStore {
    fn describe(&self) -> String {
        self.location.clone()
    }

    fn is_healthy(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn ping(&self) -> Result<(), DbError> {
        match tokio::time::timeout(Self::PROBE_TIMEOUT, sqlx::query("SELECT 1").execute(&self.pool))
            .await
        {
            Ok(result) => result.map(|_| ()).map_err(DbError::from),
            Err(_) => Err(DbError::Transient("postgres ping timed out".to_string())),
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
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO messages (content, created_at, updated_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(content)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, content))?;

        Ok(Message {
            id,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn recent_message_ids(&self, channel_id: &str, limit: u32) -> Result<Vec<i64>, DbError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT message_id FROM message_history
            WHERE channel_id = $1
            ORDER BY sent_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(channel_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn select_random_excluding(&self, excluded: &[i64]) -> Result<Option<Message>, DbError> {
        // `<> ALL` over an empty array is true, so no exclusions means no filter.
        let row = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, content, created_at, updated_at FROM messages
            WHERE id <> ALL($1)
            ORDER BY random()
            LIMIT 1
            "#,
        )
        .bind(excluded)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_history(
        &self,
        message_id: i64,
        channel_id: &str,
    ) -> Result<MessageHistory, DbError> {
        let sent_at = now_nanos();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO message_history (message_id, channel_id, sent_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(message_id)
        .bind(channel_id)
        .bind(sent_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(MessageHistory {
            id,
            message_id,
            channel_id: channel_id.to_string(),
            sent_at,
        })
    }

    async fn messages_after(&self, after_id: i64, limit: u32) -> Result<Vec<Message>, DbError> {
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, content, created_at, updated_at FROM messages
            WHERE id > $1
            ORDER BY id
            LIMIT $2
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
            WHERE id > $1
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn close(&self) -> Result<(), DbError> {
        self.pool.close().await;
        Ok(())
    }
}
