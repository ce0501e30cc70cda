//! One-way notification sink towards the admin chat.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::RequestError;
use tracing::{debug, warn};

use super::RateLimiter;

/// Identifies a message that can later be retracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle(pub i32);

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] RequestError),
}

/// Where progress and results are reported.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<MessageHandle, NotifyError>;

    async fn retract(&self, handle: MessageHandle) -> Result<(), NotifyError>;
}

/// Sends notices to a single Telegram chat.
#[derive(Debug)]
pub struct TelegramNotifier {
    bot: Bot,
    chat: ChatId,
    limiter: RateLimiter,
}

impl TelegramNotifier {
    #[must_use]
    pub const fn new(bot: Bot, chat: ChatId, limiter: RateLimiter) -> Self {
        Self { bot, chat, limiter }
    }

    async fn send_once(&self, text: &str) -> Result<Message, RequestError> {
        self.limiter.wait_and_acquire().await;
        self.bot.send_message(self.chat, text).await
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<MessageHandle, NotifyError> {
        let message = match self.send_once(text).await {
            Err(RequestError::RetryAfter(after)) => {
                self.limiter.handle_flood_wait(after.seconds()).await;
                self.send_once(text).await?
            }
            other => other?,
        };
        debug!("Sent message {} to chat {}", message.id.0, self.chat);
        Ok(MessageHandle(message.id.0))
    }

    async fn retract(&self, handle: MessageHandle) -> Result<(), NotifyError> {
        self.limiter.wait_and_acquire().await;
        if let Err(e) = self.bot.delete_message(self.chat, MessageId(handle.0)).await {
            warn!("Could not delete message {}: {}", handle.0, e);
            return Err(e.into());
        }
        Ok(())
    }
}
