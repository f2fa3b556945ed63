mod quote;

use crate::{Context, Error};
use quote::quote;

#[poise::command(slash_command, rename = "stock", subcommands("quote"))]
pub async fn stock_command(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}
