//! Persisted OAuth credential.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::AuthError;
use crate::persist::write_atomic;

/// Credential as stored on disk.
///
/// The layout matches what spotdl reads from its `--cache-path`, so the same
/// file authorizes both the bot and the downloader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    pub refresh_token: String,

    /// Lifetime in seconds, as returned by the token endpoint.
    pub expires_in: i64,

    /// Absolute expiry (unix seconds), stamped when the token is saved.
    #[serde(default)]
    pub expires_at: i64,

    /// Provider fields (`token_type`, `scope`, ...) carried along untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body returned by the token endpoint for both code exchange and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Turns the response into a token, keeping `previous_refresh` when the
    /// endpoint did not issue a new refresh token.
    ///
    /// The returned token is not stamped yet; [`TokenFile::save`] does that.
    #[must_use]
    pub fn into_token(self, previous_refresh: Option<&str>) -> Token {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_owned))
            .unwrap_or_default();

        let mut extra = Map::new();
        if let Some(token_type) = self.token_type {
            extra.insert("token_type".to_owned(), Value::String(token_type));
        }
        if let Some(scope) = self.scope {
            extra.insert("scope".to_owned(), Value::String(scope));
        }

        Token {
            access_token: self.access_token,
            refresh_token,
            expires_in: self.expires_in,
            expires_at: 0,
            extra,
        }
    }
}

/// Expiry check against an explicit clock.
#[must_use]
pub const fn is_expired(token: &Token, now: i64) -> bool {
    now >= token.expires_at
}

/// Location of the token file.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored token.
    ///
    /// A missing or unparsable file means "no token" and is never an error.
    #[must_use]
    pub fn load(&self) -> Option<Token> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring unparsable token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Stamps `expires_at = now + expires_in` and writes the token.
    pub fn save(&self, token: Token) -> Result<Token, AuthError> {
        self.save_at(token, chrono::Utc::now().timestamp())
    }

    /// Same as [`save`](Self::save) with an explicit issue time.
    pub fn save_at(&self, mut token: Token, now: i64) -> Result<Token, AuthError> {
        token.expires_at = now + token.expires_in;

        let json = serde_json::to_vec_pretty(&token)?;
        write_atomic(&self.path, &json).map_err(|source| AuthError::Storage {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            "Saved token to {} (expires at {})",
            self.path.display(),
            token.expires_at
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "access".to_owned(),
            token_type: Some("Bearer".to_owned()),
            expires_in: 3600,
            refresh_token: refresh.map(str::to_owned),
            scope: Some("user-library-read".to_owned()),
        }
    }

    #[test]
    fn test_into_token_carries_refresh_over() {
        let token = response(None).into_token(Some("old-refresh"));
        assert_eq!(token.refresh_token, "old-refresh");

        let token = response(Some("new-refresh")).into_token(Some("old-refresh"));
        assert_eq!(token.refresh_token, "new-refresh");
    }

    #[test]
    fn test_save_stamps_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("cache/.spotipy"));

        let mut token = response(Some("r")).into_token(None);
        token.expires_at = 1;
        let saved = file.save_at(token, 1_000).unwrap();
        assert_eq!(saved.expires_at, 4_600);

        let loaded = file.load().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.extra.get("token_type"), Some(&Value::from("Bearer")));
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join(".spotipy"));
        assert!(file.load().is_none());

        fs::write(file.path(), "{ not json").unwrap();
        assert!(file.load().is_none());
    }

    #[test]
    fn test_is_expired_boundary() {
        let mut token = response(None).into_token(None);
        token.expires_at = 100;
        assert!(!is_expired(&token, 99));
        assert!(is_expired(&token, 100));
        assert!(is_expired(&token, 101));
    }
}
