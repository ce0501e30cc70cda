//! The sync engine.
//!
//! A tracked query is a playlist, album, library collection or search whose
//! resolved tracks are remembered in the manifest. Syncing re-resolves it,
//! diffs the fresh list against the stored one, moves/deletes files on
//! disk, downloads what is new and only then rewrites the manifest entry.

mod error;
mod manifest;
mod orchestrator;
mod reconcile;

pub use error::{FileActionError, ManifestError, SyncError};
pub use manifest::{Manifest, ManifestIssue, ManifestStore, TrackedQuery};
pub use orchestrator::{QueryOutcome, SyncOrchestrator, SyncReport, SyncStats};
pub use reconcile::{ApplyReport, Rename, SyncPlan, apply_plan, reconcile, reconcile_between};
