//! External capabilities that turn queries into tracks and tracks into files.
//!
//! The sync engine only sees the two traits here. The production
//! implementation drives the `spotdl` CLI; tests plug in fakes.

mod spotdl;

use async_trait::async_trait;

use crate::auth::Token;
use crate::library::Track;

pub use spotdl::{SpotdlConfig, SpotdlProvider, is_rate_limit_error};

/// Which credentials a provider call should run with.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// App credentials only; enough for public tracks, albums and playlists.
    ClientOnly,
    /// The user's token, required for library queries.
    User(Token),
}

impl Credentials {
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

/// Resolves a query into its current, authoritative track list.
#[async_trait]
pub trait QueryResolver: Send + Sync {
    async fn resolve(&self, query: &str, credentials: &Credentials) -> Result<Vec<Track>, ProviderError>;
}

/// Downloads a batch of tracks.
///
/// `Ok` means every track in the batch is on disk at the path derived from
/// `pattern`. Anything short of that is an error.
#[async_trait]
pub trait DownloadProvider: Send + Sync {
    async fn fetch(
        &self,
        tracks: &[Track],
        pattern: &str,
        credentials: &Credentials,
    ) -> Result<(), ProviderError>;
}

/// Failures of the external provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rate limited by Spotify; gave up after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Provider failed ({status}): {output}")]
    Failed { status: String, output: String },

    #[error("{failed} track(s) could not be downloaded: {details}")]
    Incomplete { failed: usize, details: String },

    #[error("Unexpected provider output: {0}")]
    InvalidOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
