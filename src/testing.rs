//! In-memory stand-ins for the external collaborators, shared by tests.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Map;

use crate::auth::{AuthError, AuthProvider, Token, TokenFile, TokenResponse};
use crate::library::{Track, derive_path};
use crate::provider::{Credentials, DownloadProvider, ProviderError, QueryResolver};
use crate::telegram::{MessageHandle, Notifier, NotifyError};

/// Token endpoint that never touches the network.
#[derive(Default)]
pub struct FakeAuth {
    pub refresh_calls: AtomicUsize,
    pub refresh_returns_new_refresh: bool,
    pub reject: bool,
    pub seen_codes: Mutex<Vec<String>>,
}

impl FakeAuth {
    fn response(&self, refresh: Option<&str>) -> Result<TokenResponse, AuthError> {
        if self.reject {
            return Err(AuthError::Rejected {
                status: 400,
                body: r#"{"error":"invalid_grant"}"#.to_owned(),
            });
        }
        Ok(TokenResponse {
            access_token: "fresh-access".to_owned(),
            token_type: Some("Bearer".to_owned()),
            expires_in: 3600,
            refresh_token: refresh.map(str::to_owned),
            scope: None,
        })
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    fn authorize_url(&self) -> String {
        "https://accounts.example/authorize".to_owned()
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        self.seen_codes.lock().unwrap().push(code.to_owned());
        self.response(Some("issued-refresh"))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let new_refresh = self.refresh_returns_new_refresh.then_some("rotated-refresh");
        self.response(new_refresh)
    }
}

pub fn stored_token(expires_at: i64) -> Token {
    Token {
        access_token: "old-access".to_owned(),
        refresh_token: "original-refresh".to_owned(),
        expires_in: 3600,
        expires_at,
        extra: Map::new(),
    }
}

/// Writes a token as is, without re-stamping its expiry.
pub fn write_token(file: &TokenFile, token: &Token) {
    if let Some(parent) = file.path().parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(file.path(), serde_json::to_vec(token).unwrap()).unwrap();
}

pub fn track(id: &str, title: &str) -> Track {
    Track::new(format!("https://open.spotify.com/track/{id}"), title, "Band")
}

/// Resolver answering from a table.
#[derive(Default)]
pub struct FakeResolver {
    pub results: Mutex<HashMap<String, Vec<Track>>>,
    /// (query, ran with user credentials)
    pub calls: Mutex<Vec<(String, bool)>>,
}

impl FakeResolver {
    pub fn set(&self, query: &str, tracks: Vec<Track>) {
        self.results.lock().unwrap().insert(query.to_owned(), tracks);
    }
}

#[async_trait]
impl QueryResolver for FakeResolver {
    async fn resolve(&self, query: &str, credentials: &Credentials) -> Result<Vec<Track>, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_owned(), credentials.is_user()));
        self.results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidOutput(format!("unknown query {query}")))
    }
}

/// Downloader writing one small file per track, like the real one would.
#[derive(Default)]
pub struct FakeDownloader {
    pub fail: AtomicBool,
    pub rate_limited: AtomicBool,
    pub batches: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl DownloadProvider for FakeDownloader {
    async fn fetch(
        &self,
        tracks: &[Track],
        pattern: &str,
        _credentials: &Credentials,
    ) -> Result<(), ProviderError> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(ProviderError::RateLimited { attempts: 5 });
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Incomplete {
                failed: tracks.len(),
                details: "LookupError".to_owned(),
            });
        }
        for track in tracks {
            let path = derive_path(track, pattern, "mp3");
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, track.id()).unwrap();
        }
        self.batches
            .lock()
            .unwrap()
            .push(tracks.iter().map(|t| t.url.clone()).collect());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Sent(i32, String),
    Retracted(i32),
}

/// Notifier that records what would have been sent.
#[derive(Default)]
pub struct RecordingNotifier {
    next_id: AtomicI32,
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notice::Sent(_, text) => Some(text.clone()),
                Notice::Retracted(_) => None,
            })
            .collect()
    }

    pub fn retracted(&self) -> Vec<i32> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notice::Retracted(id) => Some(*id),
                Notice::Sent(..) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<MessageHandle, NotifyError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.notices
            .lock()
            .unwrap()
            .push(Notice::Sent(id, text.to_owned()));
        Ok(MessageHandle(id))
    }

    async fn retract(&self, handle: MessageHandle) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(Notice::Retracted(handle.0));
        Ok(())
    }
}
