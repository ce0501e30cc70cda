//! Output-pattern expansion.
//!
//! A pattern such as `/music/{album-artist}/{album}/{artists} - {title}.{output-ext}`
//! is expanded against a [`Track`] into the file path the downloader writes.
//! Expansion is a pure function of the track metadata, the pattern and the
//! extension, which is what lets the reconciler compare old and new paths.

use std::path::{Path, PathBuf};

use super::Track;

/// Audio container used when none is configured.
pub const DEFAULT_EXTENSION: &str = "mp3";

/// Extension of the lyrics file written next to a track.
const LYRICS_EXTENSION: &str = "lrc";

/// Derives the on-disk path for a track.
///
/// Unknown placeholders are kept literally so a typo in a pattern shows up in
/// the file name instead of silently collapsing paths together.
#[must_use]
pub fn derive_path(track: &Track, pattern: &str, extension: &str) -> PathBuf {
    let mut out = String::with_capacity(pattern.len() + 32);
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        let Some(end) = after.find('}') else {
            out.push_str(after);
            rest = "";
            break;
        };

        let key = &after[1..end];
        match placeholder(track, key, extension) {
            Some(value) => out.push_str(&sanitize(&value)),
            None => out.push_str(&after[..=end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    PathBuf::from(out)
}

/// Path of the lyrics sidecar belonging to an audio file.
#[must_use]
pub fn lyrics_path(audio: &Path) -> PathBuf {
    audio.with_extension(LYRICS_EXTENSION)
}

fn placeholder(track: &Track, key: &str, extension: &str) -> Option<String> {
    let value = match key {
        "title" => track.name.clone(),
        "artist" => track.artist.clone(),
        "artists" => {
            if track.artists.is_empty() {
                track.artist.clone()
            } else {
                track.artists.join(", ")
            }
        }
        "album" => track.album_name.clone(),
        "album-artist" => track.album_artist.clone(),
        "genre" => extra_list_first(track, "genres"),
        "disc-number" => track.disc_number.to_string(),
        "disc-count" => extra_string(track, "disc_count"),
        "duration" => track.duration.to_string(),
        "year" => track.year().unwrap_or_default().to_owned(),
        "original-date" => track.date.clone(),
        "track-number" => format!("{:02}", track.track_number),
        "tracks-count" => track.tracks_count.to_string(),
        "isrc" => extra_string(track, "isrc"),
        "track-id" => extra_string(track, "song_id"),
        "publisher" => extra_string(track, "publisher"),
        "list-name" | "list-length" | "list-position" => list_placeholder(track, key),
        "output-ext" => extension.to_owned(),
        _ => return None,
    };
    Some(value)
}

/// List placeholders. The position is padded to the width of the list
/// length, so files sort in order.
fn list_placeholder(track: &Track, key: &str) -> String {
    let list = track.membership().unwrap_or_default();
    match key {
        "list-name" => list.name,
        "list-length" => list.length.to_string(),
        _ => {
            let width = list.length.to_string().len();
            format!("{:0width$}", list.position)
        }
    }
}

fn extra_string(track: &Track, key: &str) -> String {
    match track.extra.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn extra_list_first(track: &Track, key: &str) -> String {
    track
        .extra
        .get(key)
        .and_then(serde_json::Value::as_array)
        .and_then(|items| items.first())
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Makes a metadata value safe to use inside a single path component.
///
/// Same rules the downloader applies when it names files, so derived paths
/// match what is on disk: `/ ? \ * | < >` are dropped, `"` becomes `'` and
/// `:` becomes `-`.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter_map(|ch| match ch {
            '/' | '?' | '\\' | '*' | '|' | '<' | '>' => None,
            '"' => Some('\''),
            ':' => Some('-'),
            c => Some(c),
        })
        .collect()
}
