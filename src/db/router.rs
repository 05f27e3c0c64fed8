//! Per-request routing between the primary and secondary stores.
//!
//! A [`Route`] is created for one logical request and threaded through all of
//! its sub-operations. It starts on the preferred handle, may fall back to the
//! secondary once (before anything has succeeded), and from the first success
//! onwards stays on that handle, so a request never reads recency state from
//! one store and writes history to the other.

use super::models::{Message, MessageHistory};
use super::store::MessageStore;
use super::{DbError, StorePair};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upper bound for any single store call made through a route.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Which handle of the pair a route is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Primary,
    Secondary,
}

impl StoreRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// Store selection for one logical request.
pub struct Route<'a> {
    pair: &'a StorePair,
    role: StoreRole,
    pinned: bool,
}

/// Run one store call through the route, falling back once if allowed.
macro_rules! routed {
    ($route:ident, $op:literal, |$store:ident| $call:expr) => {{
        let outcome = {
            let $store = $route.store();
            bounded($op, $call).await
        };
        match outcome {
            Ok(value) => {
                $route.pinned = true;
                Ok(value)
            }
            Err(err) => {
                let $store = $route.fall_back($op, err)?;
                let value = bounded($op, $call).await?;
                $route.pinned = true;
                Ok(value)
            }
        }
    }};
}

impl<'a> Route<'a> {
    /// Start a route on the preferred handle.
    ///
    /// The primary is preferred while it reports healthy. If it does not and a
    /// healthy secondary exists, the route starts on the secondary.
    pub(super) fn new(pair: &'a StorePair) -> Self {
        let role = match pair.secondary() {
            Some(secondary) if !pair.primary().is_healthy() && secondary.is_healthy() => {
                warn!(
                    secondary = %secondary.describe(),
                    "Primary store unhealthy; routing request to secondary"
                );
                StoreRole::Secondary
            }
            _ => StoreRole::Primary,
        };
        Self {
            pair,
            role,
            pinned: false,
        }
    }

    /// Handle this route currently uses.
    pub fn role(&self) -> StoreRole {
        self.role
    }

    fn store(&self) -> &'a dyn MessageStore {
        match (self.role, self.pair.secondary()) {
            (StoreRole::Secondary, Some(secondary)) => secondary,
            _ => self.pair.primary() as &dyn MessageStore,
        }
    }

    /// Switch to the secondary after a primary failure, or hand the error back.
    fn fall_back(
        &mut self,
        op: &'static str,
        err: DbError,
    ) -> Result<&'a dyn MessageStore, DbError> {
        if self.pinned || self.role == StoreRole::Secondary || !err.is_store_failure() {
            return Err(err);
        }
        let Some(secondary) = self.pair.secondary() else {
            return Err(err);
        };

        warn!(
            op,
            error = %err,
            secondary = %secondary.describe(),
            "Primary store failed; falling back to secondary"
        );
        self.role = StoreRole::Secondary;
        Ok(secondary)
    }

    pub async fn insert_message(&mut self, content: &str) -> Result<Message, DbError> {
        routed!(self, "insert_message", |store| store.insert_message(content))
    }

    pub async fn recent_message_ids(
        &mut self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<i64>, DbError> {
        routed!(self, "recent_message_ids", |store| store
            .recent_message_ids(channel_id, limit))
    }

    pub async fn select_random_excluding(
        &mut self,
        excluded: &[i64],
    ) -> Result<Option<Message>, DbError> {
        routed!(self, "select_random_excluding", |store| store
            .select_random_excluding(excluded))
    }

    pub async fn insert_history(
        &mut self,
        message_id: i64,
        channel_id: &str,
    ) -> Result<MessageHistory, DbError> {
        routed!(self, "insert_history", |store| store
            .insert_history(message_id, channel_id))
    }
}

async fn bounded<T>(
    op: &'static str,
    fut: impl Future<Output = Result<T, DbError>>,
) -> Result<T, DbError> {
    match tokio::time::timeout(OPERATION_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(DbError::Transient(format!("{op} timed out"))),
    }
}
