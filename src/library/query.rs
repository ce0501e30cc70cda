//! Classification of user queries.

use std::fmt;

use url::Url;

/// What a query string refers to.
///
/// Produced once by [`QueryKind::classify`]; everything downstream matches on
/// the variant instead of inspecting the query text again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Track,
    Album,
    Playlist,
    Artist,
    /// The user's liked songs.
    SavedTracks,
    /// Every album saved in the user's library.
    SavedAlbums,
    /// Every playlist owned or followed by the user.
    UserPlaylists,
    /// Every artist the user follows.
    FollowedArtists,
    /// Anything else: handed to the resolver as a free-text search.
    Search,
}

/// Keyword understood by the downloader for the liked-songs collection.
pub const SAVED_TRACKS_QUERY: &str = "saved";
pub const SAVED_ALBUMS_QUERY: &str = "all-user-saved-albums";
pub const USER_PLAYLISTS_QUERY: &str = "all-user-playlists";
pub const FOLLOWED_ARTISTS_QUERY: &str = "all-user-followed-artists";

const SPOTIFY_HOST: &str = "open.spotify.com";

const TRACK_PATTERN: &str = "{artist}/{artists} - {title}.{output-ext}";
const ALBUM_PATTERN: &str = "{album-artist}/{album}/{artists} - {title}.{output-ext}";
const PLAYLIST_PATTERN: &str = "Playlists/{list-name}/{artists} - {title}.{output-ext}";
const LIKED_PATTERN: &str = "Liked Songs/{artists} - {title}.{output-ext}";
const FALLBACK_PATTERN: &str = "{artists} - {title}.{output-ext}";

impl QueryKind {
    /// Classifies a query string.
    #[must_use]
    pub fn classify(query: &str) -> Self {
        let query = query.trim();

        match query {
            SAVED_TRACKS_QUERY | "all-user-saved-songs" => return Self::SavedTracks,
            SAVED_ALBUMS_QUERY => return Self::SavedAlbums,
            USER_PLAYLISTS_QUERY => return Self::UserPlaylists,
            FOLLOWED_ARTISTS_QUERY => return Self::FollowedArtists,
            _ => {}
        }

        let Some(url) = spotify_url(query) else {
            return Self::Search;
        };

        // Path looks like /track/<id> or /intl-es/track/<id>
        let resource = url
            .path_segments()
            .into_iter()
            .flatten()
            .find(|segment| !segment.is_empty() && !segment.starts_with("intl-"));

        match resource {
            Some("track") => Self::Track,
            Some("album") => Self::Album,
            Some("playlist") => Self::Playlist,
            Some("artist") => Self::Artist,
            _ => Self::Search,
        }
    }

    /// Output pattern used when the user does not pick one, relative to the
    /// download directory.
    #[must_use]
    pub const fn default_output_pattern(self) -> &'static str {
        match self {
            Self::Track | Self::Artist | Self::FollowedArtists => TRACK_PATTERN,
            Self::Album | Self::SavedAlbums => ALBUM_PATTERN,
            Self::Playlist | Self::UserPlaylists => PLAYLIST_PATTERN,
            Self::SavedTracks => LIKED_PATTERN,
            Self::Search => FALLBACK_PATTERN,
        }
    }

    /// Whether resolving this query needs the user's own authorization.
    #[must_use]
    pub const fn requires_user_auth(self) -> bool {
        matches!(
            self,
            Self::SavedTracks | Self::SavedAlbums | Self::UserPlaylists | Self::FollowedArtists
        )
    }

    /// Short label used in notifications.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Artist => "artist",
            Self::SavedTracks => "liked songs",
            Self::SavedAlbums => "saved albums",
            Self::UserPlaylists => "your playlists",
            Self::FollowedArtists => "followed artists",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Checks whether the text is an `https://open.spotify.com/...` link.
#[must_use]
pub fn is_spotify_url(text: &str) -> bool {
    spotify_url(text.trim()).is_some()
}

fn spotify_url(text: &str) -> Option<Url> {
    let url = Url::parse(text).ok()?;
    if url.scheme() != "https" || url.host_str() != Some(SPOTIFY_HOST) {
        return None;
    }
    let has_resource = url
        .path_segments()
        .is_some_and(|mut segments| segments.any(|s| s.chars().any(char::is_alphanumeric)));
    has_resource.then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_urls() {
        assert_eq!(
            QueryKind::classify("https://open.spotify.com/track/2zQvtkghOHiBG48Bj0oFR9"),
            QueryKind::Track
        );
        assert_eq!(
            QueryKind::classify("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3?si=x"),
            QueryKind::Album
        );
        assert_eq!(
            QueryKind::classify("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            QueryKind::Playlist
        );
        assert_eq!(
            QueryKind::classify("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF"),
            QueryKind::Artist
        );
    }

    #[test]
    fn test_classify_locale_segment() {
        assert_eq!(
            QueryKind::classify(
                "https://open.spotify.com/intl-es/track/2zQvtkghOHiBG48Bj0oFR9?si=0645845c6cab417f"
            ),
            QueryKind::Track
        );
    }

    #[test]
    fn test_classify_keywords() {
        assert_eq!(QueryKind::classify("saved"), QueryKind::SavedTracks);
        assert_eq!(QueryKind::classify("all-user-saved-albums"), QueryKind::SavedAlbums);
        assert_eq!(QueryKind::classify("all-user-playlists"), QueryKind::UserPlaylists);
        assert_eq!(
            QueryKind::classify("all-user-followed-artists"),
            QueryKind::FollowedArtists
        );
    }

    #[test]
    fn test_classify_does_not_match_substrings() {
        // A search mentioning "album" is still a search.
        assert_eq!(QueryKind::classify("best album ever"), QueryKind::Search);
        assert_eq!(
            QueryKind::classify("https://example.com/album/123"),
            QueryKind::Search
        );
    }

    #[test]
    fn test_is_spotify_url() {
        assert!(is_spotify_url("https://open.spotify.com/track/abc"));
        assert!(is_spotify_url("  https://open.spotify.com/album/abc  "));
        assert!(!is_spotify_url("http://open.spotify.com/track/abc"));
        assert!(!is_spotify_url("https://open.spotify.com/"));
        assert!(!is_spotify_url("open.spotify.com/track/abc"));
    }

    #[test]
    fn test_user_auth_requirements() {
        assert!(QueryKind::SavedTracks.requires_user_auth());
        assert!(QueryKind::UserPlaylists.requires_user_auth());
        assert!(!QueryKind::Playlist.requires_user_auth());
        assert!(!QueryKind::Search.requires_user_auth());
    }

    #[test]
    fn test_default_patterns() {
        assert_eq!(
            QueryKind::Playlist.default_output_pattern(),
            "Playlists/{list-name}/{artists} - {title}.{output-ext}"
        );
        assert_eq!(
            QueryKind::SavedTracks.default_output_pattern(),
            "Liked Songs/{artists} - {title}.{output-ext}"
        );
        assert_eq!(
            QueryKind::SavedAlbums.default_output_pattern(),
            QueryKind::Album.default_output_pattern()
        );
    }
}
