//! Authorization-code flow against the Spotify accounts service.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::{AuthError, TokenResponse};

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes needed to read the user's library, playlists and followed artists.
pub const SCOPES: &str = "playlist-read-private user-follow-read user-library-read";

/// Token endpoint operations.
///
/// Implemented over HTTP by [`SpotifyAuth`]; tests substitute their own.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// URL the user opens to grant access.
    fn authorize_url(&self) -> String;

    /// Exchanges an authorization code for a token.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError>;

    /// Exchanges a refresh token for a fresh access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// HTTP client for the accounts service, built once at startup.
#[derive(Debug, Clone)]
pub struct SpotifyAuth {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SpotifyAuth {
    #[must_use]
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            http: Client::new(),
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    fn basic_authorization(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", STANDARD.encode(credentials))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .header(reqwest::header::AUTHORIZATION, self.basic_authorization())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl AuthProvider for SpotifyAuth {
    fn authorize_url(&self) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", SCOPES),
        ];
        Url::parse_with_params(AUTHORIZE_URL, &params)
            .map_or_else(|_| AUTHORIZE_URL.to_owned(), String::from)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        info!("Exchanging authorization code for a token");
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        debug!("Refreshing access token");
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

/// Extracts the authorization code from what the user pasted back.
///
/// Accepts either the full redirect URL or the bare code. A redirect that
/// carries `error=...` means the user declined.
pub fn parse_redirect(input: &str) -> Result<String, AuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::MissingCode(String::new()));
    }

    let Ok(url) = Url::parse(input) else {
        return Ok(input.to_owned());
    };

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => return Err(AuthError::Denied(value.into_owned())),
            "code" => code = Some(value.into_owned()),
            _ => {}
        }
    }

    code.filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::MissingCode(input.to_owned()))
}
