//! Track metadata as produced by the resolver.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single resolved track.
///
/// Field names follow the song JSON written by `spotdl save`, so manifest
/// entries can be handed back to the downloader unchanged. Fields the bot
/// does not interpret are kept in `extra` and written back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Canonical track URL. Stable across re-resolution; this is the identity.
    pub url: String,

    /// Track title.
    pub name: String,

    /// Primary artist.
    #[serde(default)]
    pub artist: String,

    /// All credited artists, primary first.
    #[serde(default)]
    pub artists: Vec<String>,

    #[serde(default)]
    pub album_name: String,

    #[serde(default)]
    pub album_artist: String,

    #[serde(default = "default_one")]
    pub disc_number: u32,

    #[serde(default)]
    pub track_number: u32,

    /// Number of tracks on the album.
    #[serde(default)]
    pub tracks_count: u32,

    /// Release date as reported by the provider (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`).
    #[serde(default)]
    pub date: String,

    /// Duration in seconds.
    #[serde(default)]
    pub duration: u64,

    #[serde(default)]
    pub cover_url: Option<String>,

    /// Name of the playlist/album this track was resolved through.
    #[serde(default)]
    pub list_name: Option<String>,

    #[serde(default)]
    pub list_url: Option<String>,

    /// 1-based position inside the list.
    #[serde(default)]
    pub list_position: Option<u32>,

    #[serde(default)]
    pub list_length: Option<u32>,

    /// Provider fields not interpreted here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where a track sits inside the list it was resolved from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMembership {
    pub name: String,
    pub url: Option<String>,
    pub position: u32,
    pub length: u32,
}

const fn default_one() -> u32 {
    1
}

impl Track {
    /// Creates a track with the minimal identifying metadata.
    #[must_use]
    pub fn new(url: impl Into<String>, name: impl Into<String>, artist: impl Into<String>) -> Self {
        let artist = artist.into();
        Self {
            url: url.into(),
            name: name.into(),
            artists: vec![artist.clone()],
            artist,
            album_name: String::new(),
            album_artist: String::new(),
            disc_number: 1,
            track_number: 0,
            tracks_count: 0,
            date: String::new(),
            duration: 0,
            cover_url: None,
            list_name: None,
            list_url: None,
            list_position: None,
            list_length: None,
            extra: Map::new(),
        }
    }

    /// Returns the stable identity of this track.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.url
    }

    /// Returns the list membership when the track was resolved through a list.
    #[must_use]
    pub fn membership(&self) -> Option<ListMembership> {
        if self.list_name.is_none() && self.list_position.is_none() && self.list_length.is_none() {
            return None;
        }
        Some(ListMembership {
            name: self.list_name.clone().unwrap_or_default(),
            url: self.list_url.clone(),
            position: self.list_position.unwrap_or(0),
            length: self.list_length.unwrap_or(0),
        })
    }

    /// Release year, if the date carries one.
    #[must_use]
    pub fn year(&self) -> Option<&str> {
        self.date.get(..4).filter(|y| y.chars().all(|c| c.is_ascii_digit()))
    }

    /// Human-readable "Artists - Title" label.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.artists.is_empty() {
            format!("{} - {}", self.artist, self.name)
        } else {
            format!("{} - {}", self.artists.join(", "), self.name)
        }
    }
}
