//! Command handler implementation.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use super::types::{BotCommand, CommandResult};
use crate::auth::{TokenFile, is_expired};
use crate::library::QueryKind;
use crate::sync::ManifestStore;
use crate::worker::{WorkerHandle, WorkerMessage};

/// Turns chat messages into worker jobs and answers read-only commands.
///
/// Nothing here mutates the manifest or the token; that is the worker's job.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    prefix: String,
    worker: WorkerHandle,
    manifest: ManifestStore,
    token_file: TokenFile,
    download_dir: PathBuf,
}

impl CommandHandler {
    #[must_use]
    pub const fn new(
        prefix: String,
        worker: WorkerHandle,
        manifest: ManifestStore,
        token_file: TokenFile,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            prefix,
            worker,
            manifest,
            token_file,
            download_dir,
        }
    }

    /// Parses and executes a message. `None` if it is not a command.
    pub async fn try_handle(&self, message_text: &str) -> Option<CommandResult> {
        let command = BotCommand::parse(message_text, &self.prefix)?;

        debug!("Handling command: {}", command);
        let result = self.execute(command).await;
        info!("Command result: success={}", result.success);

        Some(result)
    }

    async fn execute(&self, command: BotCommand) -> CommandResult {
        if let Some(query) = command.download_query() {
            return self.handle_download(query).await;
        }

        match command {
            BotCommand::Start => self.handle_start(),
            BotCommand::Help => self.handle_help(),
            BotCommand::Authorize { force } => {
                self.submit(
                    WorkerMessage::Authorize { force },
                    "🔑 Preparing the authorization link...",
                )
                .await
            }
            BotCommand::Code(input) => {
                self.submit(
                    WorkerMessage::CompleteAuthorization(input),
                    "🔑 Checking the authorization code...",
                )
                .await
            }
            BotCommand::Sync(query) => self.handle_sync(query).await,
            BotCommand::Tracked => self.handle_tracked(),
            BotCommand::Untrack(query) => self.handle_untrack(query).await,
            BotCommand::Status => self.handle_status().await,
            BotCommand::Version => handle_version(),
            BotCommand::Download(_)
            | BotCommand::Liked
            | BotCommand::Albums
            | BotCommand::Playlists => CommandResult::error("Unsupported download request."),
        }
    }

    async fn handle_download(&self, query: &str) -> CommandResult {
        let kind = QueryKind::classify(query);
        if kind == QueryKind::Search {
            return CommandResult::error(
                "That is not a Spotify link. Send a track, album, playlist or artist URL.",
            );
        }

        let pattern = self
            .download_dir
            .join(kind.default_output_pattern())
            .to_string_lossy()
            .into_owned();

        self.submit(
            WorkerMessage::Download {
                query: query.to_owned(),
                pattern,
            },
            format!("📥 Queued download of {kind}."),
        )
        .await
    }

    async fn handle_sync(&self, query: Option<String>) -> CommandResult {
        match query {
            Some(query) => {
                if self.manifest.get(&query).is_none() {
                    return CommandResult::error(format!(
                        "{query} is not tracked. Use /tracked to see what is."
                    ));
                }
                self.submit(WorkerMessage::Sync(Some(query)), "🔄 Sync queued.")
                    .await
            }
            None => {
                self.submit(WorkerMessage::Sync(None), "🔄 Sync of all tracked queries queued.")
                    .await
            }
        }
    }

    fn handle_tracked(&self) -> CommandResult {
        let manifest = self.manifest.read();
        if manifest.queries.is_empty() {
            return CommandResult::success("Nothing is tracked yet. Send a Spotify link to start.");
        }

        let mut lines = vec![format!("Tracked queries ({}):", manifest.queries.len())];
        for (i, entry) in manifest.queries.iter().enumerate() {
            let kind = QueryKind::classify(&entry.query);
            lines.push(format!(
                "{}. {} [{kind}] - {} tracks",
                i + 1,
                entry.query,
                entry.songs.len()
            ));
        }
        CommandResult::success(lines.join("\n"))
    }

    async fn handle_untrack(&self, query: String) -> CommandResult {
        if self.manifest.get(&query).is_none() {
            return CommandResult::error(format!("{query} is not tracked."));
        }
        self.submit(WorkerMessage::Untrack(query), "🗑 Untrack queued.")
            .await
    }

    async fn handle_status(&self) -> CommandResult {
        let manifest = self.manifest.read();
        let auth = match self.token_file.load() {
            None => "not authorized",
            Some(token) if is_expired(&token, chrono::Utc::now().timestamp()) => {
                "authorized (token will be refreshed)"
            }
            Some(_) => "authorized",
        };

        let state = self.worker.state().read().await;
        let activity = match (&state.current_job, state.current_elapsed()) {
            (Some(job), Some(elapsed)) => format!("{job} (for {})", format_duration(elapsed)),
            (Some(job), None) => job.clone(),
            _ => "idle".to_owned(),
        };
        let last_sync = state.last_sync.as_ref().map_or_else(
            || "never".to_owned(),
            |last| {
                format!(
                    "{} at {}",
                    last.summary,
                    last.finished_at.format("%Y-%m-%d %H:%M UTC")
                )
            },
        );
        let next_sync = state
            .time_until_next_sync()
            .map_or_else(|| "off".to_owned(), |d| format!("in {}", format_duration(d)));

        let message = format!(
            "Spotify: {auth}\n\
             Tracked: {} queries, {} tracks\n\
             Worker: {activity}\n\
             Queued: {}\n\
             Jobs: {} done, {} failed\n\
             Last sync: {last_sync}\n\
             Auto sync: {next_sync}",
            manifest.queries.len(),
            manifest.track_count(),
            state.queued,
            state.jobs_completed,
            state.jobs_failed,
        );
        CommandResult::success(message)
    }

    fn handle_start(&self) -> CommandResult {
        let help = self.handle_help();
        CommandResult::success(format!(
            "👋 Send me a Spotify link and I will download it and keep it in sync.\n\n{}",
            help.message
        ))
    }

    fn handle_help(&self) -> CommandResult {
        let mut lines = vec!["Commands:".to_owned()];
        for (usage, description) in BotCommand::all_commands() {
            lines.push(format!("  {}{usage} - {description}", self.prefix));
        }
        lines.push(String::new());
        lines.push("A bare Spotify link works like /download.".to_owned());
        CommandResult::success(lines.join("\n"))
    }

    async fn submit(&self, message: WorkerMessage, ack: impl Into<String>) -> CommandResult {
        match self.worker.submit(message).await {
            Ok(0) => CommandResult::success(ack),
            Ok(ahead) => CommandResult::success(format!("{} ({ahead} job(s) ahead)", ack.into())),
            Err(e) => CommandResult::error(format!("❌ {e}")),
        }
    }
}

fn handle_version() -> CommandResult {
    let version = env!("CARGO_PKG_VERSION");
    CommandResult::success(format!(
        "Spotify Sync Bot v{version}\n\
         Downloads Spotify music with spotdl and keeps it in sync."
    ))
}

/// Formats a duration as `1h 5m`, `3m` or `42s`.
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;

    if hours > 0 && minutes > 0 {
        format!("{hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::{RwLock, mpsc};

    use super::*;
    use crate::testing::{stored_token, track, write_token};
    use crate::worker::WorkerState;

    const ALBUM: &str = "https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3";

    struct Harness {
        dir: tempfile::TempDir,
        handler: CommandHandler,
        rx: mpsc::Receiver<WorkerMessage>,
        state: Arc<RwLock<WorkerState>>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let state = Arc::new(RwLock::new(WorkerState::new()));
        let handler = CommandHandler::new(
            "/".to_owned(),
            WorkerHandle::new(tx, Arc::clone(&state)),
            ManifestStore::new(dir.path().join("sync.json")),
            TokenFile::new(dir.path().join(".spotipy")),
            PathBuf::from("/music"),
        );
        Harness {
            dir,
            handler,
            rx,
            state,
        }
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let h = harness();
        assert!(h.handler.try_handle("just chatting").await.is_none());
    }

    #[tokio::test]
    async fn test_bare_url_queues_download_with_default_pattern() {
        let mut h = harness();
        let result = h.handler.try_handle(ALBUM).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "📥 Queued download of album.");

        assert_eq!(
            h.rx.recv().await.unwrap(),
            WorkerMessage::Download {
                query: ALBUM.to_owned(),
                pattern: "/music/{album-artist}/{album}/{artists} - {title}.{output-ext}"
                    .to_owned(),
            }
        );
        assert_eq!(h.state.read().await.queued, 1);
    }

    #[tokio::test]
    async fn test_liked_shortcut() {
        let mut h = harness();
        h.handler.try_handle("/liked").await.unwrap();
        let WorkerMessage::Download { query, pattern } = h.rx.recv().await.unwrap() else {
            panic!("expected a download");
        };
        assert_eq!(query, "saved");
        assert_eq!(pattern, "/music/Liked Songs/{artists} - {title}.{output-ext}");
    }

    #[tokio::test]
    async fn test_download_rejects_search_text() {
        let mut h = harness();
        let result = h.handler.try_handle("/download some song").await.unwrap();
        assert!(!result.success);
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queue_position_in_ack() {
        let h = harness();
        h.handler.try_handle("/sync").await.unwrap();
        let second = h.handler.try_handle("/sync").await.unwrap();
        assert!(second.message.ends_with("(1 job(s) ahead)"));
    }

    #[tokio::test]
    async fn test_sync_and_untrack_unknown_query() {
        let mut h = harness();
        assert!(!h.handler.try_handle("/sync saved").await.unwrap().success);
        assert!(!h.handler.try_handle("/untrack saved").await.unwrap().success);
        assert!(h.rx.try_recv().is_err());

        h.handler
            .manifest
            .upsert("saved", vec![track("1", "A")], "/music/{title}")
            .unwrap();
        assert!(h.handler.try_handle("/untrack saved").await.unwrap().success);
        assert_eq!(
            h.rx.recv().await.unwrap(),
            WorkerMessage::Untrack("saved".to_owned())
        );
    }

    #[tokio::test]
    async fn test_tracked_listing() {
        let h = harness();
        let empty = h.handler.try_handle("/tracked").await.unwrap();
        assert!(empty.message.starts_with("Nothing is tracked"));

        h.handler
            .manifest
            .upsert(ALBUM, vec![track("1", "A"), track("2", "B")], "/music/{title}")
            .unwrap();
        let listing = h.handler.try_handle("/tracked").await.unwrap();
        assert!(listing.message.contains(&format!("1. {ALBUM} [album] - 2 tracks")));
    }

    #[tokio::test]
    async fn test_status() {
        let h = harness();
        let status = h.handler.try_handle("/status").await.unwrap();
        assert!(status.message.contains("Spotify: not authorized"));
        assert!(status.message.contains("Worker: idle"));
        assert!(status.message.contains("Auto sync: off"));

        write_token(
            &TokenFile::new(h.dir.path().join(".spotipy")),
            &stored_token(chrono::Utc::now().timestamp() + 600),
        );
        h.state.write().await.start_job("sync all".to_owned());
        let status = h.handler.try_handle("/status").await.unwrap();
        assert!(status.message.contains("Spotify: authorized\n"));
        assert!(status.message.contains("Worker: sync all (for 0s)"));
    }

    #[tokio::test]
    async fn test_stopped_worker_is_reported() {
        let h = harness();
        drop(h.rx);
        let result = h.handler.try_handle("/authorize").await.unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(3660)), "1h 1m");
    }
}
