//! Chat command handlers.
//!
//! Commands are `!`-prefixed words at the start of a message:
//! - `!ping`: liveness reply
//! - `!new <text>`: save a message (direct messages only)
//! - `!eo`: replay a random message not recently shown in this channel
//! - `!crawl`: import earlier bot messages from this channel's history

mod crawl;
mod messages;
mod ping;

pub use crawl::CrawlHandler;
pub use messages::{EoHandler, NewHandler};
pub use ping::PingHandler;

use crate::config::Config;
use crate::crawl::CrawlSettings;
use crate::db::{DEFAULT_RECENT_WINDOW, StorePair};
use crate::error::{HandlerError, HandlerResult};
use crate::transport::{ChatEvent, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, debug, info_span, warn};

/// Runtime settings handlers read on every command.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub recent_window: u32,
    pub crawl: CrawlSettings,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            recent_window: DEFAULT_RECENT_WINDOW,
            crawl: CrawlSettings::default(),
        }
    }
}

impl From<&Config> for BotSettings {
    fn from(config: &Config) -> Self {
        Self {
            recent_window: config.selector.recent_window,
            crawl: CrawlSettings::from(&config.crawl),
        }
    }
}

/// Everything a handler needs for one inbound event.
pub struct Context<'a> {
    pub db: &'a StorePair,
    pub transport: &'a dyn Transport,
    pub event: &'a ChatEvent,
    pub settings: &'a BotSettings,
}

impl Context<'_> {
    /// Send `text` to the channel the event came from.
    pub async fn reply(&self, text: &str) -> Result<String, HandlerError> {
        Ok(self.transport.send(&self.event.channel_id, text).await?)
    }
}

/// Trait implemented by all command handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle a command. `args` is the trimmed text after the command word.
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> HandlerResult;
}

/// Split `!name rest` into a lower-cased command name and its arguments.
pub fn parse_command(content: &str) -> Option<(String, &str)> {
    let body = content.trim().strip_prefix('!')?;
    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some((name.to_ascii_lowercase(), args))
}

/// Registry of command handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
    /// Per-command usage counters.
    command_counts: HashMap<&'static str, Arc<AtomicU64>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();
        handlers.insert("ping", Box::new(PingHandler));
        handlers.insert("new", Box::new(NewHandler));
        handlers.insert("eo", Box::new(EoHandler));
        handlers.insert("crawl", Box::new(CrawlHandler));

        let command_counts = handlers
            .keys()
            .map(|name| (*name, Arc::new(AtomicU64::new(0))))
            .collect();

        Self {
            handlers,
            command_counts,
        }
    }

    /// How many times `name` has been dispatched.
    pub fn command_count(&self, name: &str) -> u64 {
        self.command_counts
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Dispatch one inbound event.
    ///
    /// Handler errors are logged and answered with [`HandlerError::to_reply`].
    /// Only a failure to deliver that reply is returned.
    pub async fn dispatch(&self, ctx: &Context<'_>) -> HandlerResult {
        if ctx.event.from_self {
            return Ok(());
        }
        let Some((name, args)) = parse_command(&ctx.event.content) else {
            return Ok(());
        };
        let Some((key, handler)) = self.handlers.get_key_value(name.as_str()) else {
            debug!(command = %name, "Ignoring unknown command");
            return Ok(());
        };

        if let Some(counter) = self.command_counts.get(key) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let span = info_span!(
            "command",
            name = %key,
            channel = %ctx.event.channel_id,
            direct = ctx.event.direct,
        );
        let result = handler.handle(ctx, args).instrument(span).await;

        let Err(e) = result else {
            return Ok(());
        };
        warn!(
            command = %key,
            channel = %ctx.event.channel_id,
            code = e.error_code(),
            error = %e,
            "Command failed"
        );
        match e.to_reply() {
            Some(text) => ctx.reply(text).await.map(|_| ()),
            None => Err(e),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::transport::{ChatEvent, RemoteMessage, Transport, TransportError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport that records everything and serves scripted history pages.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<(String, String)>>,
        pub edits: Mutex<Vec<(String, String)>>,
        pub pages: Mutex<Vec<Vec<RemoteMessage>>>,
        pub fail_fetch: bool,
    }

    impl RecordingTransport {
        pub fn sent_texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }

        pub fn last_edit(&self) -> Option<String> {
            self.edits.lock().unwrap().last().map(|(_, t)| t.clone())
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, channel_id: &str, text: &str) -> Result<String, TransportError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((channel_id.to_string(), text.to_string()));
            Ok(format!("sent-{}", sent.len()))
        }

        async fn edit(
            &self,
            _channel_id: &str,
            message_id: &str,
            text: &str,
        ) -> Result<(), TransportError> {
            self.edits
                .lock()
                .unwrap()
                .push((message_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn fetch_before(
            &self,
            _channel_id: &str,
            _before: Option<&str>,
            _limit: u32,
        ) -> Result<Vec<RemoteMessage>, TransportError> {
            if self.fail_fetch {
                return Err(TransportError::Fetch("forbidden".to_string()));
            }
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(pages.remove(0))
            }
        }
    }

    pub fn event(channel_id: &str, direct: bool, content: &str) -> ChatEvent {
        ChatEvent {
            channel_id: channel_id.to_string(),
            author_id: "user-1".to_string(),
            direct,
            from_self: false,
            content: content.to_string(),
        }
    }
}
