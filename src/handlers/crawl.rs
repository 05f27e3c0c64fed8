//! CRAWL command handler.

use super::{Context, Handler};
use crate::crawl::crawl_channel;
use crate::error::HandlerResult;
use async_trait::async_trait;

/// `!crawl`: import earlier bot messages from this channel.
pub struct CrawlHandler;

#[async_trait]
impl Handler for CrawlHandler {
    async fn handle(&self, ctx: &Context<'_>, _args: &str) -> HandlerResult {
        let status_id = ctx
            .reply("🔄 Crawling channel history for EO Bot messages...")
            .await?;

        let repo = ctx.db.messages();
        crawl_channel(
            &repo,
            ctx.transport,
            &ctx.event.channel_id,
            &status_id,
            &ctx.settings.crawl,
        )
        .await?;
        Ok(())
    }
}
