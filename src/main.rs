//! Spotify Sync Bot - Main Entry Point
//!
//! A Telegram bot that downloads Spotify music and keeps it in sync.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Input;
use teloxide::prelude::*;
use teloxide::types::BotCommand as MenuCommand;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use spotify_sync_bot::auth::{AuthProvider, AuthState, SpotifyAuth, TokenFile, TokenStore};
use spotify_sync_bot::commands::{BotCommand, CommandHandler};
use spotify_sync_bot::config::{BotSettings, SpotifyConfig, TelegramConfig};
use spotify_sync_bot::provider::{SpotdlConfig, SpotdlProvider};
use spotify_sync_bot::sync::{ManifestStore, SyncOrchestrator};
use spotify_sync_bot::telegram::{RateLimiter, TelegramNotifier};
use spotify_sync_bot::worker::{SyncWorker, WorkerMessage};

/// Pause between outgoing notifications.
const NOTIFY_INTERVAL_MS: u64 = 1000;

const QUEUE_CAPACITY: usize = 32;

/// Telegram bot that downloads Spotify music and keeps it in sync.
#[derive(Parser, Debug)]
#[command(name = "spotify_sync_bot")]
#[command(about = "Download Spotify music with spotdl and keep it in sync")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Authorize the Spotify account from the terminal and exit.
    #[arg(long)]
    authorize: bool,
}

/// Chat whose commands are executed.
#[derive(Debug, Clone, Copy)]
struct AdminChat(ChatId);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let spotify = SpotifyConfig::from_env()
        .context("Failed to load Spotify configuration from environment")?;
    let settings = BotSettings::from_env().context("Failed to load bot settings")?;

    let auth: Arc<dyn AuthProvider> = Arc::new(SpotifyAuth::new(
        spotify.client_id.clone(),
        spotify.client_secret.clone(),
        spotify.redirect_uri.clone(),
    ));
    let mut tokens = TokenStore::new(TokenFile::new(settings.token_path.clone()), auth);

    if args.authorize {
        return authorize_in_terminal(&mut tokens).await;
    }

    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    std::fs::create_dir_all(&settings.cache_dir).with_context(|| {
        format!("Failed to create cache directory {}", settings.cache_dir.display())
    })?;

    let spotdl = Arc::new(SpotdlProvider::new(SpotdlConfig {
        binary: settings.spotdl_bin.clone(),
        client_id: spotify.client_id,
        client_secret: spotify.client_secret,
        token_path: settings.token_path.clone(),
        work_dir: settings.cache_dir.clone(),
        format: settings.audio_format.clone(),
        max_retries: settings.max_retries,
        retry_wait: settings.retry_wait(),
    }));

    let orchestrator = SyncOrchestrator::new(
        ManifestStore::new(settings.manifest_path.clone()),
        Arc::clone(&spotdl) as _,
        spotdl,
        tokens,
        settings.audio_format.clone(),
    );

    let bot = Bot::new(&tg_config.token);
    let notifier = Arc::new(TelegramNotifier::new(
        bot.clone(),
        ChatId(tg_config.notify_chat),
        RateLimiter::from_millis(NOTIFY_INTERVAL_MS),
    ));

    let worker = SyncWorker::new(orchestrator, notifier).with_sync_interval(settings.sync_interval());
    let (worker_handle, worker_rx) = worker.channel(QUEUE_CAPACITY);

    let handler = Arc::new(CommandHandler::new(
        settings.command_prefix.clone(),
        worker_handle.clone(),
        ManifestStore::new(settings.manifest_path.clone()),
        TokenFile::new(settings.token_path.clone()),
        settings.download_dir.clone(),
    ));

    info!("Starting Spotify sync bot...");
    info!("Download directory: {}", settings.download_dir.display());
    info!("Manifest: {}", settings.manifest_path.display());
    if settings.sync_interval_secs > 0 {
        info!("Automatic sync every {}s", settings.sync_interval_secs);
    }

    let worker_task = tokio::spawn(async move {
        worker.run(worker_rx).await;
    });

    register_commands(&bot).await;

    let schema = Update::filter_message()
        .filter(|msg: Message, admin: AdminChat| msg.chat.id == admin.0)
        .endpoint(handle_message);

    info!("Bot is running. Use Ctrl+C to stop.");

    Dispatcher::builder(bot, schema)
        .dependencies(dptree::deps![handler, AdminChat(ChatId(tg_config.admin_chat))])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down...");
    let _ = worker_handle.submit(WorkerMessage::Shutdown).await;
    let _ = worker_task.await;

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    handler: Arc<CommandHandler>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Some(result) = handler.try_handle(text).await {
        bot.send_message(msg.chat.id, result.message).await?;
    }
    Ok(())
}

/// Publishes the command menu. Failure only costs autocompletion.
async fn register_commands(bot: &Bot) {
    let menu: Vec<MenuCommand> = BotCommand::all_commands()
        .iter()
        .filter_map(|(usage, description)| {
            let name = usage.split_whitespace().next()?;
            Some(MenuCommand::new(name, *description))
        })
        .collect();

    if let Err(e) = bot.set_my_commands(menu).await {
        warn!("Failed to register bot commands: {}", e);
    }
}

/// Runs the authorization code flow from the terminal.
async fn authorize_in_terminal(tokens: &mut TokenStore) -> Result<()> {
    if tokens.state(chrono::Utc::now().timestamp()) == AuthState::Valid {
        info!("A valid token already exists; it will be replaced");
    }

    let url = tokens.begin_authorization();
    println!("Open this URL in a browser and approve access:\n\n{url}\n");

    let redirect: String = Input::new()
        .with_prompt("Paste the URL you were redirected to")
        .interact_text()?;

    tokens
        .complete_authorization(&redirect)
        .await
        .context("Authorization failed")?;

    println!("✓ Spotify account authorized. Token saved to {}", tokens.file().path().display());
    Ok(())
}
