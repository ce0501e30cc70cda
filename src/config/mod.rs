//! Configuration module for the sync bot.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by the binary).

mod settings;

pub use settings::{BotSettings, ConfigError, SpotifyConfig, TelegramConfig};
