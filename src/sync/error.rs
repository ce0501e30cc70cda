use std::path::PathBuf;

use crate::auth::AuthError;
use crate::provider::ProviderError;

/// Manifest file could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode manifest: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single query failed to sync.
///
/// The manifest entry for the query is left untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Could not resolve {query}: {source}")]
    Resolution {
        query: String,
        #[source]
        source: ProviderError,
    },

    #[error("{query} resolved to no tracks")]
    EmptyResolution { query: String },

    #[error("Download failed for {query}: {source}")]
    Download {
        query: String,
        #[source]
        source: ProviderError,
    },

    #[error("{query} is not tracked")]
    NotTracked { query: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl SyncError {
    /// Whether the user has to authorize again before this can succeed.
    #[must_use]
    pub const fn requires_reauthorization(&self) -> bool {
        match self {
            Self::Auth(e) => e.requires_reauthorization(),
            _ => false,
        }
    }
}

/// A rename or delete that could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum FileActionError {
    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
