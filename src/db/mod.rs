//! Database module for persistent storage.
//!
//! Provides the dual-store persistence core:
//! - SQLite primary store (file-backed, always present)
//! - Optional secondary store (PostgreSQL, or another SQLite file)
//! - One-time copy of the secondary into an empty primary at startup
//! - Per-request fallback from primary to secondary
//! - Anti-repeat random message selection

mod messages;
mod migration;
pub mod models;
mod postgres;
mod router;
mod sqlite;
mod store;

pub use messages::{DEFAULT_RECENT_WINDOW, ImportOutcome, MessageRepository};
pub use migration::{DEFAULT_BATCH_SIZE, MigrationReport};
pub use models::{Message, MessageHistory, RowCounts};
pub use postgres::PgStore;
pub use router::{OPERATION_TIMEOUT, Route, StoreRole};
pub use sqlite::SqliteStore;
pub use store::{MessageStore, StoreUrl, redact};

use std::borrow::Cow;
use tempfile::TempPath;
use thiserror::Error;
use tracing::{error, info, warn};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Bad startup input.
    #[error("configuration error: {0}")]
    Config(String),
    /// Store unreachable.
    #[error("connection error: {0}")]
    Connection(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("migration row count mismatch: expected {expected}, found {actual}")]
    MigrationIntegrity {
        expected: RowCounts,
        actual: RowCounts,
    },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("message already exists: {0}")]
    Duplicate(String),
    /// Lock contention or timeout; the operation may succeed if retried.
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Get a static error code string for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connection(_) => "connection",
            Self::Schema(_) => "schema",
            Self::MigrationIntegrity { .. } => "migration_integrity",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Duplicate(_) => "duplicate",
            Self::Transient(_) => "transient",
            Self::Sqlx(_) => "database",
            Self::Io(_) => "io",
        }
    }

    /// Whether the store itself failed, as opposed to the request being answered
    /// with a negative result (validation, duplicate, not found).
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Schema(_) | Self::Transient(_) | Self::Sqlx(_) | Self::Io(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => DbError::Transient(err.to_string()),
            sqlx::Error::Database(db_err) if is_contention(db_err.code()) => {
                DbError::Transient(err.to_string())
            }
            _ => DbError::Sqlx(err),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Schema(err.to_string())
    }
}

/// SQLite BUSY/LOCKED (and extended variants), Postgres serialization
/// failure, lock not available, and statement cancel.
fn is_contention(code: Option<Cow<'_, str>>) -> bool {
    matches!(
        code.as_deref(),
        Some("5" | "6" | "261" | "262" | "517" | "773" | "40001" | "40P01" | "55P03" | "57014")
    )
}

/// Convert a unique-constraint hit on insert into `DbError::Duplicate`.
pub(crate) fn map_insert_error(err: sqlx::Error, content: &str) -> DbError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return DbError::Duplicate(content.to_string());
    }
    DbError::from(err)
}

/// The primary store plus an optional secondary.
///
/// Owns both handles for the life of the process. Everything else reaches the
/// stores through [`StorePair::route`], [`StorePair::messages`] and
/// [`StorePair::backup_snapshot`].
pub struct StorePair {
    primary: SqliteStore,
    secondary: Option<Box<dyn MessageStore>>,
}

impl StorePair {
    /// Open the primary store and, if configured, the secondary, then copy the
    /// secondary into an empty primary.
    ///
    /// Secondary failures are logged and leave the pair primary-only. A failed
    /// copy is returned as an error after both handles have been closed.
    pub async fn open(primary_path: &str, secondary_url: Option<&str>) -> Result<Self, DbError> {
        Self::open_with(primary_path, secondary_url, DEFAULT_BATCH_SIZE).await
    }

    /// [`StorePair::open`] with an explicit migration batch size.
    pub async fn open_with(
        primary_path: &str,
        secondary_url: Option<&str>,
        batch_size: usize,
    ) -> Result<Self, DbError> {
        let primary = SqliteStore::open(primary_path).await?;

        let secondary = match secondary_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => open_secondary(url).await,
            None => {
                info!("No secondary store configured; running primary-only");
                None
            }
        };

        let mut pair = Self { primary, secondary };
        if let Err(e) = pair.migrate_from_secondary(batch_size).await {
            error!(error = %e, "Migration from secondary store failed");
            if let Err(close_err) = pair.close().await {
                warn!(error = %close_err, "Failed to close stores after migration failure");
            }
            return Err(e);
        }
        Ok(pair)
    }

    /// Assemble a pair from already-open stores without running the migration.
    pub fn from_parts(primary: SqliteStore, secondary: Option<Box<dyn MessageStore>>) -> Self {
        Self { primary, secondary }
    }

    /// Copy the secondary into the primary if the primary is empty.
    pub async fn migrate_from_secondary(
        &mut self,
        batch_size: usize,
    ) -> Result<MigrationReport, DbError> {
        match self.secondary.as_deref() {
            Some(secondary) => migration::run(&mut self.primary, secondary, batch_size).await,
            None => Ok(MigrationReport::NoSecondary),
        }
    }

    pub fn primary(&self) -> &SqliteStore {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&dyn MessageStore> {
        self.secondary.as_deref()
    }

    /// Start a route for one logical request.
    pub fn route(&self) -> Route<'_> {
        Route::new(self)
    }

    /// Get the message repository with the default recency window.
    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(self)
    }

    /// Write a point-in-time copy of the primary to a fresh temporary file.
    ///
    /// Uses SQLite's `VACUUM INTO`, which reads inside a transaction and does
    /// not block concurrent writers. The file is deleted when the returned
    /// path is dropped.
    pub async fn backup_snapshot(&self) -> Result<TempPath, DbError> {
        let temp = tempfile::Builder::new()
            .prefix("eo-bot-backup-")
            .suffix(".sqlite")
            .tempfile()?
            .into_temp_path();

        self.primary.backup_into(&temp).await?;
        info!(path = %temp.display(), "Primary store snapshot written");
        Ok(temp)
    }

    /// Close both handles, returning the first error but always attempting both.
    pub async fn close(&self) -> Result<(), DbError> {
        let mut first_err = None;

        if let Err(e) = self.primary.close().await {
            warn!(error = %e, "Failed to close primary store");
            first_err = Some(e);
        }
        if let Some(secondary) = &self.secondary
            && let Err(e) = secondary.close().await
        {
            warn!(error = %e, "Failed to close secondary store");
            first_err.get_or_insert(e);
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                info!("Stores closed");
                Ok(())
            }
        }
    }
}

/// Open the secondary store. Every failure is logged and yields `None`.
async fn open_secondary(url: &str) -> Option<Box<dyn MessageStore>> {
    let parsed = match StoreUrl::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Invalid secondary store URL (continuing with primary only)");
            return None;
        }
    };

    let opened: Result<Box<dyn MessageStore>, DbError> = match parsed {
        StoreUrl::Postgres(url) => PgStore::open(&url)
            .await
            .map(|s| Box::new(s) as Box<dyn MessageStore>),
        StoreUrl::Sqlite(path) => SqliteStore::open(&path.to_string_lossy())
            .await
            .map(|s| Box::new(s) as Box<dyn MessageStore>),
    };

    match opened {
        Ok(store) => {
            info!(secondary = %store.describe(), "Secondary store ready");
            Some(store)
        }
        Err(e) => {
            warn!(
                error = %e,
                code = e.error_code(),
                "Failed to open secondary store (continuing with primary only)"
            );
            None
        }
    }
}
