//! Chat transport abstraction.
//!
//! The bot core only needs to send text, edit a status message it sent, and
//! page backwards through a channel's history. Concrete chat clients
//! implement [`Transport`]; the binary ships a console implementation.

pub mod console;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("transport closed")]
    Closed,
}

/// An inbound chat message addressed to the bot.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub channel_id: String,
    pub author_id: String,
    /// Sent as a direct message rather than in a shared channel.
    pub direct: bool,
    /// Authored by the bot itself.
    pub from_self: bool,
    pub content: String,
}

/// A message read back from a channel's history.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub id: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `text` to a channel, returning the transport's id for the new message.
    async fn send(&self, channel_id: &str, text: &str) -> Result<String, TransportError>;

    /// Replace the text of a message previously sent by the bot.
    async fn edit(&self, channel_id: &str, message_id: &str, text: &str)
    -> Result<(), TransportError>;

    /// Up to `limit` messages older than `before` (newest first). An empty page
    /// means the start of the channel was reached.
    async fn fetch_before(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, TransportError>;
}
