//! Spotify Sync Bot Library
//!
//! A Telegram bot that downloads Spotify queries with spotdl and keeps the
//! files on disk in step with the remote lists.
//!
//! This crate provides the core functionality for:
//! - Spotify OAuth authorization and token refresh
//! - Tracking downloaded queries in a JSON manifest
//! - Reconciling the library when a list or an output pattern changes
//! - Running sync jobs one at a time behind a queue
//! - Handling chat commands from the admin chat

pub mod auth;
pub mod commands;
pub mod config;
pub mod library;
pub mod persist;
pub mod provider;
pub mod sync;
pub mod telegram;
pub mod worker;

#[cfg(test)]
mod testing;
