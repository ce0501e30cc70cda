//! `spotdl` CLI as resolver and downloader.

use std::path::PathBuf;
use std::process::Output;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Credentials, DownloadProvider, ProviderError, QueryResolver};
use crate::library::Track;

/// Lines spotdl prints for songs it could not fetch. It still exits 0.
const FAILURE_MARKERS: [&str; 4] = [
    "LookupError",
    "AudioProviderError",
    "DownloaderError",
    "FFmpegError",
];

/// Characters of output kept in error messages.
const OUTPUT_TAIL: usize = 600;

/// How to invoke spotdl.
#[derive(Debug, Clone)]
pub struct SpotdlConfig {
    pub binary: PathBuf,
    pub client_id: String,
    pub client_secret: String,
    /// Token file shared with the bot; passed as `--cache-path`.
    pub token_path: PathBuf,
    /// Directory for the intermediate `.spotdl` song lists.
    pub work_dir: PathBuf,
    /// Audio format (`mp3`, `opus`, ...).
    pub format: String,
    pub max_retries: u32,
    pub retry_wait: Duration,
}

/// Runs spotdl as a child process.
#[derive(Debug)]
pub struct SpotdlProvider {
    config: SpotdlConfig,
    counter: AtomicU64,
}

impl SpotdlProvider {
    #[must_use]
    pub const fn new(config: SpotdlConfig) -> Self {
        Self {
            config,
            counter: AtomicU64::new(0),
        }
    }

    fn song_list_path(&self, purpose: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.config
            .work_dir
            .join(format!("{purpose}-{}-{n}.spotdl", std::process::id()))
    }

    fn credential_args(&self, credentials: &Credentials) -> Vec<String> {
        let mut args = vec![
            "--client-id".to_owned(),
            self.config.client_id.clone(),
            "--client-secret".to_owned(),
            self.config.client_secret.clone(),
        ];
        if credentials.is_user() {
            args.extend([
                "--user-auth".to_owned(),
                "--headless".to_owned(),
                "--cache-path".to_owned(),
                self.config.token_path.display().to_string(),
            ]);
        }
        args
    }

    /// Runs spotdl, retrying failed runs whose output signals rate limiting.
    async fn run(&self, args: &[String]) -> Result<String, ProviderError> {
        let program = self.config.binary.display().to_string();
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            debug!("Running {} {}", program, redact(args).join(" "));

            let output = Command::new(&self.config.binary)
                .args(args)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|source| ProviderError::Spawn {
                    program: program.clone(),
                    source,
                })?;

            let text = combined_output(&output);
            if output.status.success() {
                return Ok(text);
            }

            if !is_rate_limit_error(&text) {
                return Err(ProviderError::Failed {
                    status: output.status.to_string(),
                    output: tail(&text),
                });
            }
            warn!(
                "Rate limit detected. Retrying in {:?} (attempt {}/{})",
                self.config.retry_wait, attempt, attempts
            );
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_wait).await;
            }
        }

        Err(ProviderError::RateLimited { attempts })
    }
}

#[async_trait]
impl QueryResolver for SpotdlProvider {
    async fn resolve(&self, query: &str, credentials: &Credentials) -> Result<Vec<Track>, ProviderError> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let save_file = self.song_list_path("resolve");

        let mut args = vec![
            "save".to_owned(),
            query.to_owned(),
            "--save-file".to_owned(),
            save_file.display().to_string(),
        ];
        args.extend(self.credential_args(credentials));

        let result = self.run(&args).await;
        let content = match result {
            Ok(_) => tokio::fs::read_to_string(&save_file).await,
            Err(e) => {
                let _ = tokio::fs::remove_file(&save_file).await;
                return Err(e);
            }
        };
        let _ = tokio::fs::remove_file(&save_file).await;

        let content = content.map_err(|e| {
            ProviderError::InvalidOutput(format!("no song list written for {query}: {e}"))
        })?;
        let tracks: Vec<Track> = serde_json::from_str(&content)
            .map_err(|e| ProviderError::InvalidOutput(format!("song list for {query}: {e}")))?;

        info!("Resolved {} to {} track(s)", query, tracks.len());
        Ok(tracks)
    }
}

#[async_trait]
impl DownloadProvider for SpotdlProvider {
    async fn fetch(
        &self,
        tracks: &[Track],
        pattern: &str,
        credentials: &Credentials,
    ) -> Result<(), ProviderError> {
        if tracks.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let list_file = self.song_list_path("download");
        let json = serde_json::to_vec(tracks)
            .map_err(|e| ProviderError::InvalidOutput(e.to_string()))?;
        tokio::fs::write(&list_file, json).await?;

        let mut args = vec![
            "download".to_owned(),
            list_file.display().to_string(),
            "--output".to_owned(),
            pattern.to_owned(),
            "--format".to_owned(),
            self.config.format.clone(),
        ];
        args.extend(self.credential_args(credentials));

        info!("Downloading {} track(s)", tracks.len());
        let result = self.run(&args).await;
        let _ = tokio::fs::remove_file(&list_file).await;

        let output = result?;
        let failures = failure_lines(&output);
        if !failures.is_empty() {
            return Err(ProviderError::Incomplete {
                failed: failures.len(),
                details: tail(&failures.join("\n")),
            });
        }
        Ok(())
    }
}

/// Whether the output of a failed run indicates Spotify rate limiting.
///
/// `429` only counts as a standalone number, not inside ids or titles.
#[must_use]
pub fn is_rate_limit_error(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == "429")
}

fn failure_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter(|line| FAILURE_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(str::trim)
        .collect()
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        text.push('\n');
        text.push_str(&stderr);
    }
    text
}

fn tail(text: &str) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= OUTPUT_TAIL {
        return text.to_owned();
    }
    let skipped: String = text.chars().skip(count - OUTPUT_TAIL).collect();
    format!("...{skipped}")
}

/// Hides the client secret in logged command lines.
fn redact(args: &[String]) -> Vec<&str> {
    let mut hide_next = false;
    args.iter()
        .map(|arg| {
            if hide_next {
                hide_next = false;
                return "***";
            }
            hide_next = arg == "--client-secret";
            arg.as_str()
        })
        .collect()
}
