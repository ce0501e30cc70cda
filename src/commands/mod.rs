//! Chat commands.
//!
//! Parses messages from the admin chat and hands work to the sync worker.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{BotCommand, CommandResult};
