//! Telegram delivery sink.

use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use super::{DeliverySink, MessageFormat, SinkError};

/// Delivery sink backed by the Telegram Bot API
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    /// Creates a sink from an already-configured bot client
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn send(
        &self,
        recipient_id: &str,
        body: &str,
        format: MessageFormat,
    ) -> Result<(), SinkError> {
        let chat_id = recipient_id
            .parse::<i64>()
            .map_err(|_| SinkError::InvalidRecipient(recipient_id.to_string()))?;

        let mut request = self.bot.send_message(ChatId(chat_id), body);
        if format == MessageFormat::Markdown {
            request = request.parse_mode(ParseMode::Markdown);
        }

        request
            .await
            .map(|_| ())
            .map_err(|e| SinkError::Delivery(e.to_string()))
    }
}
