//! Spotify credentials.
//!
//! The token lives in a JSON file shared with the downloader. It is created
//! by the authorization-code flow, refreshed in place when it expires, and
//! only replaced by an explicit re-authorization.

mod error;
mod oauth;
mod store;
mod token;

pub use error::AuthError;
pub use oauth::{AuthProvider, SCOPES, SpotifyAuth, parse_redirect};
pub use store::{AuthState, TokenStore};
pub use token::{Token, TokenFile, TokenResponse, is_expired};
