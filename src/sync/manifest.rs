//! Durable record of every tracked query.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ManifestError;
use crate::library::{Track, derive_path};
use crate::persist::write_atomic;

/// One tracked query and the tracks it resolved to on its last good sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedQuery {
    pub query: String,
    /// Output pattern the files were written with.
    pub output: String,
    #[serde(default)]
    pub songs: Vec<Track>,
}

/// The whole manifest file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub queries: Vec<TrackedQuery>,
}

impl Manifest {
    #[must_use]
    pub fn get(&self, query: &str) -> Option<&TrackedQuery> {
        self.queries.iter().find(|q| q.query == query)
    }

    /// Replaces the entry for `entry.query`, or appends it.
    ///
    /// Existing entries keep their position so the file diffs cleanly.
    pub fn upsert(&mut self, entry: TrackedQuery) {
        match self.queries.iter_mut().find(|q| q.query == entry.query) {
            Some(existing) => *existing = entry,
            None => self.queries.push(entry),
        }
    }

    /// Removes an entry, returning it when it was present.
    pub fn remove(&mut self, query: &str) -> Option<TrackedQuery> {
        let index = self.queries.iter().position(|q| q.query == query)?;
        Some(self.queries.remove(index))
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.queries.iter().map(|q| q.songs.len()).sum()
    }

    /// Structural problems worth reporting.
    #[must_use]
    pub fn validate(&self, extension: &str) -> Vec<ManifestIssue> {
        let mut issues = Vec::new();
        let mut seen_queries = HashSet::new();

        for entry in &self.queries {
            if entry.query.trim().is_empty() {
                issues.push(ManifestIssue::EmptyQuery);
            }
            if !seen_queries.insert(entry.query.as_str()) {
                issues.push(ManifestIssue::DuplicateQuery(entry.query.clone()));
            }
            if entry.output.trim().is_empty() {
                issues.push(ManifestIssue::EmptyOutput(entry.query.clone()));
            }

            let mut ids = HashSet::new();
            let mut paths: HashMap<PathBuf, &str> = HashMap::new();
            for song in &entry.songs {
                if song.url.is_empty() {
                    issues.push(ManifestIssue::TrackWithoutId {
                        query: entry.query.clone(),
                        name: song.name.clone(),
                    });
                    continue;
                }
                if !ids.insert(song.id()) {
                    issues.push(ManifestIssue::DuplicateTrack {
                        query: entry.query.clone(),
                        id: song.url.clone(),
                    });
                    continue;
                }
                let path = derive_path(song, &entry.output, extension);
                if let Some(first) = paths.insert(path.clone(), song.id()) {
                    issues.push(ManifestIssue::PathCollision {
                        query: entry.query.clone(),
                        path,
                        first: first.to_owned(),
                        second: song.url.clone(),
                    });
                }
            }
        }

        issues
    }
}

/// Problems found by [`Manifest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestIssue {
    EmptyQuery,
    DuplicateQuery(String),
    EmptyOutput(String),
    TrackWithoutId { query: String, name: String },
    DuplicateTrack { query: String, id: String },
    PathCollision {
        query: String,
        path: PathBuf,
        first: String,
        second: String,
    },
}

impl std::fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyQuery => write!(f, "entry with an empty query"),
            Self::DuplicateQuery(q) => write!(f, "query listed more than once: {q}"),
            Self::EmptyOutput(q) => write!(f, "empty output pattern for {q}"),
            Self::TrackWithoutId { query, name } => {
                write!(f, "track {name:?} in {query} has no url")
            }
            Self::DuplicateTrack { query, id } => write!(f, "track {id} repeated in {query}"),
            Self::PathCollision {
                query,
                path,
                first,
                second,
            } => write!(
                f,
                "{first} and {second} in {query} both map to {}",
                path.display()
            ),
        }
    }
}

/// Result of reading the manifest file.
enum Loaded {
    Missing,
    Parsed(Manifest),
    Corrupt(String),
}

/// File-backed manifest.
///
/// Every mutation is a read-modify-write of the whole file followed by an
/// atomic replace. Callers serialize writes (see the sync worker).
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the manifest. Missing or malformed files read as empty.
    #[must_use]
    pub fn read(&self) -> Manifest {
        match self.load() {
            Loaded::Missing => Manifest::default(),
            Loaded::Parsed(manifest) => manifest,
            Loaded::Corrupt(reason) => {
                warn!(
                    "Manifest {} is unreadable, treating it as empty: {}",
                    self.path.display(),
                    reason
                );
                Manifest::default()
            }
        }
    }

    /// Reads the manifest strictly; used by tooling that wants to report
    /// corruption instead of hiding it.
    pub fn read_strict(&self) -> Result<Manifest, ManifestError> {
        let content = fs::read_to_string(&self.path).map_err(|source| ManifestError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    #[must_use]
    pub fn get(&self, query: &str) -> Option<TrackedQuery> {
        self.read().get(query).cloned()
    }

    /// Replaces the whole entry for `query`.
    pub fn upsert(&self, query: &str, tracks: Vec<Track>, output: &str) -> Result<(), ManifestError> {
        let mut manifest = self.read_for_update()?;
        manifest.upsert(TrackedQuery {
            query: query.to_owned(),
            output: output.to_owned(),
            songs: tracks,
        });
        self.write(&manifest)?;
        debug!("Manifest entry for {} updated", query);
        Ok(())
    }

    /// Drops the entry for `query`. Returns whether there was one.
    pub fn remove(&self, query: &str) -> Result<bool, ManifestError> {
        let mut manifest = self.read_for_update()?;
        let removed = manifest.remove(query).is_some();
        if removed {
            self.write(&manifest)?;
            info!("Stopped tracking {}", query);
        }
        Ok(removed)
    }

    /// Loads before a write. A corrupt file is moved aside first so the
    /// write cannot destroy whatever it still contains.
    fn read_for_update(&self) -> Result<Manifest, ManifestError> {
        match self.load() {
            Loaded::Missing => Ok(Manifest::default()),
            Loaded::Parsed(manifest) => Ok(manifest),
            Loaded::Corrupt(reason) => {
                let backup = self.corrupt_backup_path(chrono::Utc::now().timestamp());
                warn!(
                    "Manifest {} is unreadable ({}); moving it to {}",
                    self.path.display(),
                    reason,
                    backup.display()
                );
                fs::rename(&self.path, &backup).map_err(|source| ManifestError::Write {
                    path: backup,
                    source,
                })?;
                Ok(Manifest::default())
            }
        }
    }

    fn corrupt_backup_path(&self, epoch: i64) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(format!(".corrupt-{epoch}"));
        self.path.with_file_name(name)
    }

    fn load(&self) -> Loaded {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Loaded::Missing,
            Err(e) => return Loaded::Corrupt(e.to_string()),
        };
        match serde_json::from_str(&content) {
            Ok(manifest) => Loaded::Parsed(manifest),
            Err(e) => Loaded::Corrupt(e.to_string()),
        }
    }

    fn write(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let json = serde_json::to_vec_pretty(manifest).map_err(ManifestError::Encode)?;
        write_atomic(&self.path, &json).map_err(|source| ManifestError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
