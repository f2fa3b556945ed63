use std::sync::Arc;

use tracing::info;

use crate::{
    Context, Error,
    handler::Outcome,
    reply::SlashReply,
};

/// Same pipeline as the prefix trigger, as a slash command.
#[poise::command(slash_command)]
pub async fn quote(
    ctx: Context<'_>,
    #[description = "TWSE stock code (e.g., 2330)"] symbol: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let Some(ticker) = symbol.split_whitespace().next() else {
        ctx.say("請提供股票代碼，例如：2330").await?;
        return Ok(());
    };

    let handler = Arc::clone(&ctx.data().handler);
    let reply = SlashReply::new(ctx);

    let outcome = handler.quote(ticker, &reply).await;
    info!(
        user_id = ctx.author().id.get(),
        ticker,
        replied = matches!(outcome, Outcome::Replied),
        "slash quote finished"
    );

    Ok(())
}
