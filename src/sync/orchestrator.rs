//! Drives tracked queries through resolve, reconcile, apply and persist.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::{ManifestStore, SyncError, apply_plan, reconcile_between};
use crate::auth::TokenStore;
use crate::library::{QueryKind, Track};
use crate::provider::{Credentials, DownloadProvider, QueryResolver};

/// Counters for one successfully synced query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub resolved: usize,
    pub downloaded: usize,
    pub renamed: usize,
    pub deleted: usize,
    /// Renames/deletes that failed; they do not fail the query.
    pub file_errors: usize,
}

impl SyncStats {
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.downloaded + self.renamed + self.deleted > 0
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tracks, {} new, {} moved, {} removed",
            self.resolved, self.downloaded, self.renamed, self.deleted
        )?;
        if self.file_errors > 0 {
            write!(f, ", {} file error(s)", self.file_errors)?;
        }
        Ok(())
    }
}

/// Result for one query of a batch.
#[derive(Debug)]
pub struct QueryOutcome {
    pub query: String,
    pub result: Result<SyncStats, SyncError>,
}

/// Result of [`SyncOrchestrator::sync_all`].
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<QueryOutcome>,
}

impl SyncReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &SyncStats)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|s| (o.query.as_str(), s)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.query.as_str(), e)))
    }

    /// True when at least one query failed because the user must authorize again.
    #[must_use]
    pub fn needs_reauthorization(&self) -> bool {
        self.failed().any(|(_, e)| e.requires_reauthorization())
    }

    #[must_use]
    pub fn totals(&self) -> SyncStats {
        self.succeeded().fold(SyncStats::default(), |acc, (_, s)| SyncStats {
            resolved: acc.resolved + s.resolved,
            downloaded: acc.downloaded + s.downloaded,
            renamed: acc.renamed + s.renamed,
            deleted: acc.deleted + s.deleted,
            file_errors: acc.file_errors + s.file_errors,
        })
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed().count();
        write!(
            f,
            "{} of {} queries synced ({})",
            self.outcomes.len() - failed,
            self.outcomes.len(),
            self.totals()
        )
    }
}

/// The sync engine.
///
/// Owns the manifest and token store; the caller must make sure only one
/// orchestrator method runs at a time.
pub struct SyncOrchestrator {
    manifest: ManifestStore,
    resolver: Arc<dyn QueryResolver>,
    downloader: Arc<dyn DownloadProvider>,
    tokens: TokenStore,
    extension: String,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("manifest", &self.manifest)
            .field("tokens", &self.tokens)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(
        manifest: ManifestStore,
        resolver: Arc<dyn QueryResolver>,
        downloader: Arc<dyn DownloadProvider>,
        tokens: TokenStore,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            manifest,
            resolver,
            downloader,
            tokens,
            extension: extension.into(),
        }
    }

    #[must_use]
    pub const fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub const fn tokens_mut(&mut self) -> &mut TokenStore {
        &mut self.tokens
    }

    /// Syncs every tracked query. One query failing never stops the others.
    pub async fn sync_all(&self) -> SyncReport {
        let manifest = self.manifest.read();
        info!("Syncing {} tracked queries", manifest.queries.len());

        let mut report = SyncReport::default();
        for entry in manifest.queries {
            let result = self
                .run_query(&entry.query, &entry.songs, &entry.output, &entry.output)
                .await;
            log_outcome(&entry.query, &result);
            report.outcomes.push(QueryOutcome {
                query: entry.query,
                result,
            });
        }

        info!("Sync finished: {}", report);
        report
    }

    /// Syncs a single tracked query.
    pub async fn sync_query(&self, query: &str) -> Result<SyncStats, SyncError> {
        let entry = self.manifest.get(query).ok_or_else(|| SyncError::NotTracked {
            query: query.to_owned(),
        })?;
        let result = self
            .run_query(query, &entry.songs, &entry.output, &entry.output)
            .await;
        log_outcome(query, &result);
        result
    }

    /// Downloads a query and starts tracking it.
    ///
    /// An already tracked query is synced instead, moving its files if
    /// `pattern` differs from the one it was stored with.
    pub async fn download_query(&self, query: &str, pattern: &str) -> Result<SyncStats, SyncError> {
        let result = match self.manifest.get(query) {
            Some(entry) => {
                self.run_query(query, &entry.songs, &entry.output, pattern)
                    .await
            }
            None => self.run_query(query, &[], pattern, pattern).await,
        };
        log_outcome(query, &result);
        result
    }

    async fn credentials_for(&self, kind: QueryKind) -> Result<Credentials, SyncError> {
        if kind.requires_user_auth() {
            return Ok(Credentials::User(self.tokens.valid_token().await?));
        }

        match self.tokens.optional_token().await {
            Ok(Some(token)) => Ok(Credentials::User(token)),
            Ok(None) => Ok(Credentials::ClientOnly),
            Err(e) => {
                warn!("Stored token unusable, continuing with app credentials: {}", e);
                Ok(Credentials::ClientOnly)
            }
        }
    }

    async fn run_query(
        &self,
        query: &str,
        old: &[Track],
        old_pattern: &str,
        new_pattern: &str,
    ) -> Result<SyncStats, SyncError> {
        let kind = QueryKind::classify(query);
        let credentials = self.credentials_for(kind).await?;

        let tracks = self
            .resolver
            .resolve(query, &credentials)
            .await
            .map_err(|source| SyncError::Resolution {
                query: query.to_owned(),
                source,
            })?;
        if tracks.is_empty() {
            return Err(SyncError::EmptyResolution {
                query: query.to_owned(),
            });
        }

        let plan = reconcile_between(old, old_pattern, &tracks, new_pattern, &self.extension);
        info!(
            "{} ({}): {} to download, {} to move, {} to remove",
            query,
            kind,
            plan.to_download.len(),
            plan.to_rename.len(),
            plan.to_delete.len()
        );

        let applied = apply_plan(&plan);

        if !plan.to_download.is_empty() {
            self.downloader
                .fetch(&plan.to_download, new_pattern, &credentials)
                .await
                .map_err(|source| SyncError::Download {
                    query: query.to_owned(),
                    source,
                })?;
        }

        let stats = SyncStats {
            resolved: tracks.len(),
            downloaded: plan.to_download.len(),
            renamed: applied.renamed,
            deleted: applied.deleted,
            file_errors: applied.failures.len(),
        };
        self.manifest.upsert(query, tracks, new_pattern)?;
        Ok(stats)
    }
}

fn log_outcome(query: &str, result: &Result<SyncStats, SyncError>) {
    match result {
        Ok(stats) => info!("{}: {}", query, stats),
        Err(e) => error!("{}: {}", query, e),
    }
}
