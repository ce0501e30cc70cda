use std::path::PathBuf;

/// Errors raised while obtaining or refreshing Spotify credentials.
///
/// Every variant means the user has to act (usually by re-authorizing);
/// none of them is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No Spotify token stored; authorize first with /authorize")]
    MissingToken,

    #[error("Authorization was denied: {0}")]
    Denied(String),

    #[error("No authorization code found in {0:?}")]
    MissingCode(String),

    #[error("Token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to encode token: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write token file {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuthError {
    /// Whether the stored credential can no longer be used and the user must
    /// go through the authorization flow again.
    #[must_use]
    pub const fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::Denied(_) | Self::Rejected { .. }
        )
    }
}
