//! PING command handler.

use super::{Context, Handler};
use crate::error::HandlerResult;
use async_trait::async_trait;

pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &Context<'_>, _args: &str) -> HandlerResult {
        ctx.reply("Pong! 🏓").await?;
        Ok(())
    }
}
