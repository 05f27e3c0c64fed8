//! Bulk import of earlier bot messages from a channel's history.
//!
//! Pages backwards through the channel, keeps messages authored by the
//! configured bot, and imports each one. Already-stored content is skipped.
//! A short delay between pages keeps the transport under its rate limits.

use crate::config::CrawlConfig;
use crate::db::{DbError, ImportOutcome, MessageRepository};
use crate::transport::{RemoteMessage, Transport, TransportError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Only messages from a bot account with this name are imported.
    pub author_name: String,
    pub page_size: u32,
    pub page_delay: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

impl From<&CrawlConfig> for CrawlSettings {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            author_name: config.author_name.clone(),
            page_size: config.page_size,
            page_delay: Duration::from_millis(config.page_delay_ms),
        }
    }
}

/// Running totals for one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub saved: usize,
    pub skipped: usize,
}

impl CrawlStats {
    pub fn processed(&self) -> usize {
        self.saved + self.skipped
    }

    pub fn progress_text(&self) -> String {
        format!(
            "🔄 Crawling... Found {} messages ({} saved, {} skipped)",
            self.processed(),
            self.saved,
            self.skipped
        )
    }

    pub fn summary_text(&self) -> String {
        format!(
            "✅ Crawl complete! Processed {} messages.\n- Saved: {}\n- Skipped (duplicates): {}",
            self.processed(),
            self.saved,
            self.skipped
        )
    }
}

/// Content worth importing, or `None` if the message should be ignored.
pub fn importable<'m>(message: &'m RemoteMessage, author_name: &str) -> Option<&'m str> {
    if !message.author_is_bot || message.author_name != author_name {
        return None;
    }
    let content = message.content.trim();
    if content.is_empty() || content.starts_with('!') {
        return None;
    }
    Some(content)
}

/// Crawl `channel_id` from newest to oldest, editing `status_id` after each page.
///
/// A fetch failure stops the crawl: the status message is updated and the
/// error returned. Import failures other than duplicates are logged and
/// counted as skipped.
pub async fn crawl_channel(
    repo: &MessageRepository<'_>,
    transport: &dyn Transport,
    channel_id: &str,
    status_id: &str,
    settings: &CrawlSettings,
) -> Result<CrawlStats, TransportError> {
    let mut stats = CrawlStats::default();
    let mut before: Option<String> = None;

    loop {
        let page = match transport
            .fetch_before(channel_id, before.as_deref(), settings.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(channel = %channel_id, error = %e, "Error fetching messages");
                edit_status(
                    transport,
                    channel_id,
                    status_id,
                    "❌ Error: Could not fetch messages from this channel",
                )
                .await;
                return Err(e);
            }
        };

        let Some(oldest) = page.last() else {
            break;
        };
        before = Some(oldest.id.clone());

        for message in &page {
            let Some(content) = importable(message, &settings.author_name) else {
                continue;
            };
            match repo.import_message(content, channel_id).await {
                Ok(ImportOutcome::Saved(_)) => stats.saved += 1,
                Ok(ImportOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    log_import_error(channel_id, &e);
                    stats.skipped += 1;
                }
            }
        }

        debug!(
            channel = %channel_id,
            page = page.len(),
            saved = stats.saved,
            skipped = stats.skipped,
            "Crawled page"
        );
        edit_status(transport, channel_id, status_id, &stats.progress_text()).await;

        if !settings.page_delay.is_zero() {
            tokio::time::sleep(settings.page_delay).await;
        }
    }

    info!(
        channel = %channel_id,
        saved = stats.saved,
        skipped = stats.skipped,
        "Crawl complete"
    );
    edit_status(transport, channel_id, status_id, &stats.summary_text()).await;
    Ok(stats)
}

fn log_import_error(channel_id: &str, err: &DbError) {
    warn!(channel = %channel_id, code = err.error_code(), error = %err, "Error saving message");
}

async fn edit_status(transport: &dyn Transport, channel_id: &str, status_id: &str, text: &str) {
    if let Err(e) = transport.edit(channel_id, status_id, text).await {
        debug!(channel = %channel_id, error = %e, "Failed to update crawl status");
    }
}
