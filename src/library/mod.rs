//! Track metadata, query classification and on-disk path derivation.
//!
//! Everything in here is pure: no I/O, no clocks. The sync engine relies on
//! [`derive_path`] being deterministic to diff old and new track sets.

mod path;
mod query;
mod track;

pub use path::{DEFAULT_EXTENSION, derive_path, lyrics_path};
pub use query::{
    FOLLOWED_ARTISTS_QUERY, QueryKind, SAVED_ALBUMS_QUERY, SAVED_TRACKS_QUERY,
    USER_PLAYLISTS_QUERY, is_spotify_url,
};
pub use track::{ListMembership, Track};
