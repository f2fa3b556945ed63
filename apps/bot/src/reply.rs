use std::{mem::take, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use poise::CreateReply;
use serenity::all::{ChannelId, CreateAttachment, CreateMessage, Http};

use crate::Context;

/// Discord rejects messages longer than this many characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Where a command invocation sends its output.
#[async_trait]
pub trait ChatReply: Send + Sync {
    async fn say(&self, text: String) -> Result<()>;

    /// Uploads an already-loaded file.
    async fn attach(&self, bytes: Vec<u8>, filename: &str) -> Result<()>;
}

/// Replies into the channel a prefix trigger was posted in.
pub struct ChannelReply {
    http: Arc<Http>,
    channel: ChannelId,
}

impl ChannelReply {
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self { http, channel }
    }
}

#[async_trait]
impl ChatReply for ChannelReply {
    async fn say(&self, text: String) -> Result<()> {
        for chunk in split_message(&text, MESSAGE_LIMIT) {
            self.channel.say(&self.http, chunk).await?;
        }
        Ok(())
    }

    async fn attach(&self, bytes: Vec<u8>, filename: &str) -> Result<()> {
        let msg = CreateMessage::new().add_file(CreateAttachment::bytes(bytes, filename));
        self.channel.send_message(&self.http, msg).await?;
        Ok(())
    }
}

/// Replies to a (deferred) slash command.
pub struct SlashReply<'a> {
    ctx: Context<'a>,
}

impl<'a> SlashReply<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ChatReply for SlashReply<'_> {
    async fn say(&self, text: String) -> Result<()> {
        for chunk in split_message(&text, MESSAGE_LIMIT) {
            self.ctx.say(chunk).await?;
        }
        Ok(())
    }

    async fn attach(&self, bytes: Vec<u8>, filename: &str) -> Result<()> {
        self.ctx
            .send(CreateReply::default().attachment(CreateAttachment::bytes(bytes, filename)))
            .await?;
        Ok(())
    }
}

/// Splits on line boundaries where possible; a single overlong line is cut hard.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let len = line.chars().count();

        if current_len + len > limit && !current.is_empty() {
            chunks.push(take(&mut current));
            current_len = 0;
        }

        if len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                if piece.len() == limit {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
            continue;
        }

        current.push_str(line);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_message() {
        assert_eq!(split_message("📊 台積電\n收盤", 2000), vec!["📊 台積電\n收盤"]);
    }

    #[test]
    fn splits_between_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 10), vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "趨勢判斷\n風險因素";
        assert_eq!(split_message(text, 5), vec!["趨勢判斷\n", "風險因素"]);
    }

    #[test]
    fn overlong_line_is_cut() {
        let text = "x".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn nothing_in_nothing_out() {
        assert!(split_message("", 2000).is_empty());
    }
}
