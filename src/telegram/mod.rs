//! Telegram side of the bot: outgoing notifications and their pacing.

mod notifier;
mod rate_limiter;

pub use notifier::{MessageHandle, Notifier, NotifyError, TelegramNotifier};
pub use rate_limiter::RateLimiter;
