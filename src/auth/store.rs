//! Token lifecycle: load, expiry, refresh and (re-)authorization.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::{AuthError, AuthProvider, Token, TokenFile, is_expired, parse_redirect};

/// Where the credential currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoToken,
    /// An authorization URL was handed out and the code has not come back yet.
    Authorizing,
    Valid,
    /// Present but past `expires_at`; the next use refreshes it.
    Expired,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoToken => "not authorized",
            Self::Authorizing => "waiting for authorization code",
            Self::Valid => "authorized",
            Self::Expired => "authorized (token expired, will refresh)",
        };
        f.write_str(text)
    }
}

/// Owns the token file and the provider used to renew it.
///
/// Access is serialized by the sync worker, so no locking happens here.
pub struct TokenStore {
    file: TokenFile,
    provider: Arc<dyn AuthProvider>,
    pending: bool,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("file", &self.file)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    #[must_use]
    pub fn new(file: TokenFile, provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            file,
            provider,
            pending: false,
        }
    }

    #[must_use]
    pub const fn file(&self) -> &TokenFile {
        &self.file
    }

    #[must_use]
    pub fn load(&self) -> Option<Token> {
        self.file.load()
    }

    pub fn save(&self, token: Token) -> Result<Token, AuthError> {
        self.file.save(token)
    }

    #[must_use]
    pub const fn is_expired(token: &Token, now: i64) -> bool {
        is_expired(token, now)
    }

    /// Exchanges the refresh token and persists the result.
    ///
    /// The old refresh token is kept when the provider does not return one.
    /// A rejection is returned as is; nothing here retries.
    pub async fn refresh(&self, token: &Token) -> Result<Token, AuthError> {
        let response = self.provider.refresh(&token.refresh_token).await?;
        let refreshed = response.into_token(Some(&token.refresh_token));
        let saved = self.file.save(refreshed)?;
        info!("Spotify access token refreshed");
        Ok(saved)
    }

    /// Returns a non-expired token, refreshing it first when needed.
    pub async fn valid_token(&self) -> Result<Token, AuthError> {
        let token = self.load().ok_or(AuthError::MissingToken)?;
        if Self::is_expired(&token, Utc::now().timestamp()) {
            return self.refresh(&token).await;
        }
        Ok(token)
    }

    /// Like [`valid_token`](Self::valid_token) but treats a missing token as
    /// `None` instead of an error.
    pub async fn optional_token(&self) -> Result<Option<Token>, AuthError> {
        match self.valid_token().await {
            Ok(token) => Ok(Some(token)),
            Err(AuthError::MissingToken) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Starts the authorization flow and returns the URL to send to the user.
    pub fn begin_authorization(&mut self) -> String {
        if self.load().is_some() {
            info!("Re-authorizing; the current token stays in place until a new one is issued");
        }
        self.pending = true;
        self.provider.authorize_url()
    }

    /// Finishes the flow with the redirect URL (or bare code) the user sent back.
    pub async fn complete_authorization(&mut self, input: &str) -> Result<Token, AuthError> {
        let code = parse_redirect(input)?;
        let response = self.provider.exchange_code(&code).await.inspect_err(|e| {
            warn!("Authorization code exchange failed: {}", e);
        })?;

        let token = self.file.save(response.into_token(None))?;
        self.pending = false;
        info!("Spotify authorization completed");
        Ok(token)
    }

    #[must_use]
    pub fn state(&self, now: i64) -> AuthState {
        match self.load() {
            None if self.pending => AuthState::Authorizing,
            None => AuthState::NoToken,
            Some(token) if Self::is_expired(&token, now) => AuthState::Expired,
            Some(_) => AuthState::Valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::{FakeAuth, stored_token, write_token};

    fn store_with(dir: &tempfile::TempDir, auth: FakeAuth) -> (TokenStore, Arc<FakeAuth>) {
        let auth = Arc::new(auth);
        let store = TokenStore::new(TokenFile::new(dir.path().join(".spotipy")), auth.clone());
        (store, auth)
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _auth) = store_with(&dir, FakeAuth::default());

        let refreshed = store.refresh(&stored_token(0)).await.unwrap();
        assert_eq!(refreshed.refresh_token, "original-refresh");
        assert_eq!(refreshed.access_token, "fresh-access");

        let persisted = store.load().unwrap();
        assert_eq!(persisted.refresh_token, "original-refresh");
        assert!(persisted.expires_at > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_refresh_takes_rotated_token() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _auth) = store_with(
            &dir,
            FakeAuth {
                refresh_returns_new_refresh: true,
                ..FakeAuth::default()
            },
        );

        let refreshed = store.refresh(&stored_token(0)).await.unwrap();
        assert_eq!(refreshed.refresh_token, "rotated-refresh");
    }

    #[tokio::test]
    async fn test_valid_token_only_refreshes_when_expired() {
        let dir = tempfile::tempdir().unwrap();
        let (store, auth) = store_with(&dir, FakeAuth::default());

        let future = Utc::now().timestamp() + 600;
        write_token(store.file(), &stored_token(future));
        let token = store.valid_token().await.unwrap();
        assert_eq!(token.access_token, "old-access");
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 0);

        write_token(store.file(), &stored_token(0));
        let token = store.valid_token().await.unwrap();
        assert_eq!(token.access_token, "fresh-access");
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_surfaces_once() {
        let dir = tempfile::tempdir().unwrap();
        let (store, auth) = store_with(
            &dir,
            FakeAuth {
                reject: true,
                ..FakeAuth::default()
            },
        );
        write_token(store.file(), &stored_token(0));

        let err = store.valid_token().await.unwrap_err();
        assert!(err.requires_reauthorization());
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);
        // The stale token is left on disk.
        assert_eq!(store.load().unwrap().access_token, "old-access");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _auth) = store_with(&dir, FakeAuth::default());

        assert!(matches!(store.valid_token().await, Err(AuthError::MissingToken)));
        assert!(store.optional_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authorization_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, auth) = store_with(&dir, FakeAuth::default());
        let now = Utc::now().timestamp();

        assert_eq!(store.state(now), AuthState::NoToken);

        let url = store.begin_authorization();
        assert_eq!(url, "https://accounts.example/authorize");
        assert_eq!(store.state(now), AuthState::Authorizing);

        store
            .complete_authorization("http://localhost/callback?code=abc")
            .await
            .unwrap();
        assert_eq!(auth.seen_codes.lock().unwrap().as_slice(), ["abc"]);
        assert_eq!(store.state(now), AuthState::Valid);
        assert_eq!(store.state(now + 7200), AuthState::Expired);
    }

    #[tokio::test]
    async fn test_denied_authorization_keeps_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _auth) = store_with(&dir, FakeAuth::default());

        store.begin_authorization();
        let err = store
            .complete_authorization("http://localhost/callback?error=access_denied")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Denied(_)));
        assert_eq!(store.state(0), AuthState::Authorizing);
    }
}
