//! Application settings, Telegram and Spotify configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Looks up a variable by name. `std::env::var` in production.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(lookup: Lookup<'_>, name: &'static str) -> Result<String, ConfigError> {
    lookup(name).ok_or(ConfigError::MissingEnvVar(name))
}

fn parsed<T: FromStr>(
    lookup: Lookup<'_>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            var: name,
            value,
        }),
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: String,

    /// The only chat whose commands are executed.
    pub admin_chat: i64,

    /// Chat that receives job notifications. Defaults to the admin chat.
    pub notify_chat: i64,
}

impl TelegramConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `TELEGRAM_TOKEN` and `TELEGRAM_ADMIN` to be set;
    /// `TELEGRAM_GROUP` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let token = required(lookup, "TELEGRAM_TOKEN")?;
        let admin_chat = parse_chat("TELEGRAM_ADMIN", required(lookup, "TELEGRAM_ADMIN")?)?;
        let notify_chat = match lookup("TELEGRAM_GROUP") {
            Some(value) => parse_chat("TELEGRAM_GROUP", value)?,
            None => admin_chat,
        };

        Ok(Self {
            token,
            admin_chat,
            notify_chat,
        })
    }
}

fn parse_chat(var: &'static str, value: String) -> Result<i64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { var, value })
}

/// Spotify application credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Must match a redirect URI registered for the application.
    pub redirect_uri: String,
}

impl std::fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl SpotifyConfig {
    /// Reads `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET` and
    /// `SPOTIFY_REDIRECT_URI`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required(lookup, "SPOTIFY_CLIENT_ID")?,
            client_secret: required(lookup, "SPOTIFY_CLIENT_SECRET")?,
            redirect_uri: required(lookup, "SPOTIFY_REDIRECT_URI")?,
        })
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Root of the music library.
    pub download_dir: PathBuf,

    /// Holds the manifest and the token unless overridden.
    pub cache_dir: PathBuf,

    pub manifest_path: PathBuf,

    pub token_path: PathBuf,

    /// spotdl executable.
    pub spotdl_bin: PathBuf,

    /// Audio format passed to the downloader; also the file extension.
    pub audio_format: String,

    /// Automatic sync interval in seconds, 0 disables it.
    pub sync_interval_secs: u64,

    /// Attempts per downloader invocation when rate limited.
    pub max_retries: u32,

    pub retry_wait_secs: u64,

    /// Command prefix for bot commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

fn default_command_prefix() -> String {
    "/".to_owned()
}

const DEFAULT_DOWNLOAD_DIR: &str = "/music";
const DEFAULT_CACHE_DIR: &str = "/cache";
const MANIFEST_FILE: &str = "sync.json";
const TOKEN_FILE: &str = ".spotipy";

impl Default for BotSettings {
    fn default() -> Self {
        let cache_dir = PathBuf::from(DEFAULT_CACHE_DIR);
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            manifest_path: cache_dir.join(MANIFEST_FILE),
            token_path: cache_dir.join(TOKEN_FILE),
            cache_dir,
            spotdl_bin: PathBuf::from("spotdl"),
            audio_format: "mp3".to_owned(),
            sync_interval_secs: 0,
            max_retries: 5,
            retry_wait_secs: 30,
            command_prefix: default_command_prefix(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let path = |name: &str, default: PathBuf| lookup(name).map_or(default, PathBuf::from);

        let cache_dir = path("CACHE_DIR", defaults.cache_dir);
        Ok(Self {
            download_dir: path("DOWNLOAD_DIR", defaults.download_dir),
            manifest_path: path("MANIFEST_PATH", cache_dir.join(MANIFEST_FILE)),
            token_path: path("TOKEN_PATH", cache_dir.join(TOKEN_FILE)),
            cache_dir,
            spotdl_bin: path("SPOTDL_BIN", defaults.spotdl_bin),
            audio_format: lookup("AUDIO_FORMAT")
                .map_or(defaults.audio_format, |f| f.trim().trim_start_matches('.').to_owned()),
            sync_interval_secs: parsed(lookup, "SYNC_INTERVAL_SECS", defaults.sync_interval_secs)?,
            max_retries: parsed(lookup, "DOWNLOAD_MAX_RETRIES", defaults.max_retries)?,
            retry_wait_secs: parsed(lookup, "DOWNLOAD_RETRY_WAIT_SECS", defaults.retry_wait_secs)?,
            command_prefix: defaults.command_prefix,
        })
    }

    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    #[must_use]
    pub const fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {var}: {value:?} (expected an integer)")]
    InvalidNumber { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::from_lookup(&env(&[])).unwrap();
        assert_eq!(settings.download_dir, PathBuf::from("/music"));
        assert_eq!(settings.manifest_path, PathBuf::from("/cache/sync.json"));
        assert_eq!(settings.token_path, PathBuf::from("/cache/.spotipy"));
        assert_eq!(settings.audio_format, "mp3");
        assert_eq!(settings.sync_interval(), Duration::ZERO);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.retry_wait(), Duration::from_secs(30));
        assert_eq!(settings.command_prefix, "/");
    }

    #[test]
    fn test_cache_dir_moves_derived_paths() {
        let settings = BotSettings::from_lookup(&env(&[
            ("CACHE_DIR", "/data"),
            ("TOKEN_PATH", "/secrets/token"),
            ("AUDIO_FORMAT", ".opus"),
        ]))
        .unwrap();
        assert_eq!(settings.manifest_path, PathBuf::from("/data/sync.json"));
        assert_eq!(settings.token_path, PathBuf::from("/secrets/token"));
        assert_eq!(settings.audio_format, "opus");
    }

    #[test]
    fn test_invalid_number() {
        let err = BotSettings::from_lookup(&env(&[("SYNC_INTERVAL_SECS", "hourly")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                var: "SYNC_INTERVAL_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_telegram_config() {
        let err = TelegramConfig::from_lookup(&env(&[("TELEGRAM_TOKEN", "t")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("TELEGRAM_ADMIN")));

        let config =
            TelegramConfig::from_lookup(&env(&[("TELEGRAM_TOKEN", "t"), ("TELEGRAM_ADMIN", "42")]))
                .unwrap();
        assert_eq!(config.admin_chat, 42);
        assert_eq!(config.notify_chat, 42);

        let config = TelegramConfig::from_lookup(&env(&[
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_ADMIN", "42"),
            ("TELEGRAM_GROUP", "-100123"),
        ]))
        .unwrap();
        assert_eq!(config.notify_chat, -100_123);
    }

    #[test]
    fn test_spotify_config_hides_secret() {
        let config = SpotifyConfig::from_lookup(&env(&[
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "hunter2"),
            ("SPOTIFY_REDIRECT_URI", "http://localhost:8888/callback"),
        ]))
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
        assert!(matches!(
            SpotifyConfig::from_lookup(&env(&[])),
            Err(ConfigError::MissingEnvVar("SPOTIFY_CLIENT_ID"))
        ));
    }
}
