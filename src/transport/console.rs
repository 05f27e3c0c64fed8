//! Line-oriented console transport.
//!
//! Each stdin line is one chat event:
//! - `dm <text>` is a direct message
//! - `#chan <text>` is posted in channel `#chan`
//! - anything else is posted in channel `console`
//!
//! Replies are written to the output as `[channel] text`.

use super::{ChatEvent, RemoteMessage, Transport, TransportError};
use crate::db::StorePair;
use crate::handlers::{BotSettings, Context, Registry};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const CONSOLE_CHANNEL: &str = "console";
pub const DIRECT_CHANNEL: &str = "dm";

pub struct ConsoleTransport<W> {
    out: Mutex<W>,
    next_id: AtomicU64,
}

impl ConsoleTransport<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleTransport<W> {
    async fn write_line(&self, line: String) -> Result<(), TransportError> {
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Transport for ConsoleTransport<W> {
    async fn send(&self, channel_id: &str, text: &str) -> Result<String, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write_line(format!("[{channel_id}] {text}\n")).await?;
        Ok(format!("console-{id}"))
    }

    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        self.write_line(format!("[{channel_id}] ({message_id}) {text}\n"))
            .await
    }

    async fn fetch_before(
        &self,
        _channel_id: &str,
        _before: Option<&str>,
        _limit: u32,
    ) -> Result<Vec<RemoteMessage>, TransportError> {
        // The console keeps no history.
        Ok(Vec::new())
    }
}

/// Turn one input line into a chat event.
pub fn parse_line(line: &str) -> Option<ChatEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (channel_id, direct, content) = if let Some(rest) = line.strip_prefix("dm ") {
        (DIRECT_CHANNEL.to_string(), true, rest.trim())
    } else if line.starts_with('#') {
        match line.split_once(char::is_whitespace) {
            Some((channel, rest)) => (channel.to_string(), false, rest.trim()),
            None => return None,
        }
    } else {
        (CONSOLE_CHANNEL.to_string(), false, line)
    };

    Some(ChatEvent {
        channel_id,
        author_id: "console".to_string(),
        direct,
        from_self: false,
        content: content.to_string(),
    })
}

/// Feed input lines to the registry until EOF.
pub async fn run<R, W>(
    input: R,
    transport: &ConsoleTransport<W>,
    registry: &Registry,
    db: &StorePair,
    settings: &BotSettings,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(event) = parse_line(&line) else {
            continue;
        };
        debug!(channel = %event.channel_id, direct = event.direct, "Console event");

        let ctx = Context {
            db,
            transport,
            event: &event,
            settings,
        };
        if let Err(e) = registry.dispatch(&ctx).await {
            warn!(error = %e, "Console transport failed");
        }
    }
    Ok(())
}
