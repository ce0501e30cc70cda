//! Diffing a stored track list against a fresh resolution, and applying the
//! resulting file actions.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::FileActionError;
use crate::library::{Track, derive_path, lyrics_path};

/// A file that must move because its derived path changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// What one sync cycle has to do for a single query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Tracks not present in the previous resolution.
    pub to_download: Vec<Track>,
    pub to_rename: Vec<Rename>,
    pub to_delete: Vec<PathBuf>,
}

impl SyncPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.to_rename.is_empty() && self.to_delete.is_empty()
    }
}

/// Diffs `old` against `new` when both were laid out with `pattern`.
#[must_use]
pub fn reconcile(old: &[Track], new: &[Track], pattern: &str, extension: &str) -> SyncPlan {
    reconcile_between(old, pattern, new, pattern, extension)
}

/// Diffs `old` (laid out with `old_pattern`) against `new` (to be laid out
/// with `new_pattern`).
///
/// A track whose id survives is never deleted and re-downloaded: if its
/// path changed it is renamed. When two surviving tracks derive the same
/// path, the first one in `new` keeps it and the other's old file is
/// deleted.
///
/// A removed track's file is deleted even when its path is about to be
/// reused by a rename or a download; deletes run first. Only files a
/// surviving track stays at, or moves out of, are never deleted.
#[must_use]
pub fn reconcile_between(
    old: &[Track],
    old_pattern: &str,
    new: &[Track],
    new_pattern: &str,
    extension: &str,
) -> SyncPlan {
    let mut old_paths: HashMap<&str, PathBuf> = HashMap::with_capacity(old.len());
    let mut old_order: Vec<&str> = Vec::with_capacity(old.len());
    for track in old {
        if !old_paths.contains_key(track.id()) {
            old_paths.insert(track.id(), derive_path(track, old_pattern, extension));
            old_order.push(track.id());
        }
    }

    let new_ids: HashSet<&str> = new.iter().map(Track::id).collect();

    let mut plan = SyncPlan::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(new.len());
    // Final path -> id of the track that owns it.
    let mut claimed: HashMap<PathBuf, &str> = HashMap::with_capacity(new.len());
    let mut displaced: Vec<PathBuf> = Vec::new();
    // Paths a surviving track keeps without moving.
    let mut kept: HashSet<PathBuf> = HashSet::new();

    for track in new {
        if !seen.insert(track.id()) {
            continue;
        }
        let new_path = derive_path(track, new_pattern, extension);

        if let Some(owner) = claimed.get(&new_path) {
            warn!(
                "{} and {} both map to {}; keeping the first",
                owner,
                track.id(),
                new_path.display()
            );
            if let Some(old_path) = old_paths.get(track.id()) {
                displaced.push(old_path.clone());
            }
            continue;
        }
        claimed.insert(new_path.clone(), track.id());

        match old_paths.get(track.id()) {
            Some(old_path) if *old_path != new_path => plan.to_rename.push(Rename {
                from: old_path.clone(),
                to: new_path,
            }),
            Some(_) => {
                kept.insert(new_path);
            }
            None => plan.to_download.push(track.clone()),
        }
    }

    let rename_sources: HashSet<&Path> = plan.to_rename.iter().map(|r| r.from.as_path()).collect();
    let removed = old_order
        .iter()
        .filter(|id| !new_ids.contains(*id))
        .filter_map(|id| old_paths.get(id).cloned());

    let mut queued = HashSet::new();
    for path in removed.chain(displaced) {
        // Never delete a file that a surviving track stays at or moves from.
        if kept.contains(&path) || rename_sources.contains(path.as_path()) {
            continue;
        }
        if queued.insert(path.clone()) {
            plan.to_delete.push(path);
        }
    }

    plan
}

/// Outcome of [`apply_plan`].
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub renamed: usize,
    pub deleted: usize,
    pub failures: Vec<FileActionError>,
}

/// Carries out the deletes and renames of a plan.
///
/// Individual failures are collected, never propagated. Deletes run first,
/// then renames go through temporary names so chains and swaps (a playlist
/// reorder) never clobber each other. Lyrics sidecars follow their audio
/// file.
pub fn apply_plan(plan: &SyncPlan) -> ApplyReport {
    let mut report = ApplyReport::default();

    for path in &plan.to_delete {
        match remove_if_present(path) {
            Ok(()) => {
                report.deleted += 1;
                if let Err(e) = remove_if_present(&lyrics_path(path)) {
                    debug!("Could not delete lyrics for {}: {}", path.display(), e);
                }
            }
            Err(source) => report.failures.push(FileActionError::Delete {
                path: path.clone(),
                source,
            }),
        }
    }

    let mut staged = Vec::with_capacity(plan.to_rename.len());
    for (index, rename) in plan.to_rename.iter().enumerate() {
        if !rename.from.exists() {
            if rename.to.exists() {
                debug!("{} already moved", rename.to.display());
                report.renamed += 1;
            } else {
                report.failures.push(FileActionError::Rename {
                    from: rename.from.clone(),
                    to: rename.to.clone(),
                    source: io::Error::new(ErrorKind::NotFound, "source file is missing"),
                });
            }
            continue;
        }

        let temp = staging_path(&rename.from, index);
        match fs::rename(&rename.from, &temp) {
            Ok(()) => {
                move_lyrics(&rename.from, &temp);
                staged.push((rename, temp));
            }
            Err(source) => report.failures.push(FileActionError::Rename {
                from: rename.from.clone(),
                to: rename.to.clone(),
                source,
            }),
        }
    }

    for (rename, temp) in staged {
        match finish_rename(&temp, &rename.to) {
            Ok(()) => report.renamed += 1,
            Err(source) => {
                if fs::rename(&temp, &rename.from).is_ok() {
                    move_lyrics(&temp, &rename.from);
                }
                report.failures.push(FileActionError::Rename {
                    from: rename.from.clone(),
                    to: rename.to.clone(),
                    source,
                });
            }
        }
    }

    for failure in &report.failures {
        warn!("{}", failure);
    }
    report
}

fn finish_rename(temp: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        // Something outside this plan already lives there; it wins.
        warn!(
            "{} already exists, dropping the file that would have replaced it",
            to.display()
        );
        remove_if_present(temp)?;
        remove_if_present(&lyrics_path(temp))?;
        return Ok(());
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(temp, to)?;
    move_lyrics(temp, to);
    Ok(())
}

fn move_lyrics(from: &Path, to: &Path) {
    let source = lyrics_path(from);
    if !source.exists() {
        return;
    }
    if let Err(e) = fs::rename(&source, lyrics_path(to)) {
        warn!("Failed to move lyrics {}: {}", source.display(), e);
    }
}

/// Deletes a file; one that is already gone counts as deleted.
fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn staging_path(from: &Path, index: usize) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(from.file_name().unwrap_or_default());
    name.push(format!(".sync-{}-{index}", std::process::id()));
    from.with_file_name(name)
}
