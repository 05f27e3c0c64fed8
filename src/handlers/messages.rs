//! NEW and EO command handlers.

use super::{Context, Handler};
use crate::error::HandlerResult;
use async_trait::async_trait;
use tracing::info;

/// `!new <text>`: save a message. Only accepted in direct messages.
pub struct NewHandler;

#[async_trait]
impl Handler for NewHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> HandlerResult {
        if !ctx.event.direct {
            return Ok(());
        }

        let message = ctx.db.messages().create_message(args).await?;
        info!(
            message_id = message.id,
            author = %ctx.event.author_id,
            "Message saved"
        );
        ctx.reply("✅ Message saved successfully!").await?;
        Ok(())
    }
}

/// `!eo`: replay a random message not recently shown in this channel.
pub struct EoHandler;

#[async_trait]
impl Handler for EoHandler {
    async fn handle(&self, ctx: &Context<'_>, _args: &str) -> HandlerResult {
        let message = ctx
            .db
            .messages()
            .with_recent_window(ctx.settings.recent_window)
            .fetch_random(&ctx.event.channel_id)
            .await?;
        ctx.reply(&message.content).await?;
        Ok(())
    }
}
