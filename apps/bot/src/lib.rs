use std::sync::Arc;

use handler::QuoteHandler;

pub mod command;
pub mod config;
pub mod handler;
pub mod health;
pub mod reply;
pub mod report;

pub struct Data {
    pub handler: Arc<QuoteHandler>,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;
