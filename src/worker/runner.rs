//! The sync worker.
//!
//! All jobs that touch the manifest or the token file run here, one at a
//! time, in the order they were submitted:
//! 1. The command handler submits a [`WorkerMessage`] through a [`WorkerHandle`]
//! 2. The worker posts a progress notice and runs the job
//! 3. The progress notice is retracted and the result is posted
//!
//! With auto-sync enabled a timer submits full syncs between jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use super::WorkerState;
use crate::auth::AuthState;
use crate::library::QueryKind;
use crate::provider::ProviderError;
use crate::sync::{SyncError, SyncOrchestrator, SyncReport, SyncStats};
use crate::telegram::{MessageHandle, Notifier};

/// Hint appended to failures that need the user to sign in again.
const REAUTHORIZE_HINT: &str = "Send /authorize to connect your Spotify account again.";

/// Jobs understood by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Download a query with the given output pattern and track it.
    Download { query: String, pattern: String },
    /// Sync one tracked query, or all of them.
    Sync(Option<String>),
    /// Start the authorization flow. Without `force` an already valid
    /// token is kept.
    Authorize { force: bool },
    /// Finish it with the redirect URL (or code) the user sent back.
    CompleteAuthorization(String),
    /// Stop tracking a query. Files stay on disk.
    Untrack(String),
    Shutdown,
}

impl WorkerMessage {
    fn describe(&self) -> String {
        match self {
            Self::Download { query, .. } => format!("download {query}"),
            Self::Sync(Some(query)) => format!("sync {query}"),
            Self::Sync(None) => "sync all".to_owned(),
            Self::Authorize { .. } => "authorize".to_owned(),
            Self::CompleteAuthorization(_) => "complete authorization".to_owned(),
            Self::Untrack(query) => format!("untrack {query}"),
            Self::Shutdown => "shutdown".to_owned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("The sync worker has stopped")]
pub struct WorkerStopped;

/// Cloneable sender side of the worker queue.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
    state: Arc<RwLock<WorkerState>>,
}

impl WorkerHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<WorkerMessage>, state: Arc<RwLock<WorkerState>>) -> Self {
        Self { tx, state }
    }

    /// Queues a job. Returns how many jobs are ahead of it.
    pub async fn submit(&self, message: WorkerMessage) -> Result<usize, WorkerStopped> {
        let ahead = {
            let mut state = self.state.write().await;
            let ahead = state.queued + usize::from(state.is_busy());
            state.queued += 1;
            ahead
        };
        if self.tx.send(message).await.is_err() {
            let mut state = self.state.write().await;
            state.queued = state.queued.saturating_sub(1);
            return Err(WorkerStopped);
        }
        Ok(ahead)
    }

    #[must_use]
    pub const fn state(&self) -> &Arc<RwLock<WorkerState>> {
        &self.state
    }
}

/// Runs jobs against the orchestrator.
pub struct SyncWorker {
    orchestrator: SyncOrchestrator,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<WorkerState>>,
    sync_interval: Option<Duration>,
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("orchestrator", &self.orchestrator)
            .field("sync_interval", &self.sync_interval)
            .finish_non_exhaustive()
    }
}

impl SyncWorker {
    #[must_use]
    pub fn new(orchestrator: SyncOrchestrator, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            orchestrator,
            notifier,
            state: Arc::new(RwLock::new(WorkerState::new())),
            sync_interval: None,
        }
    }

    /// Enables periodic full syncs. A zero interval disables them.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Creates the queue and returns the handle used to submit jobs.
    pub fn channel(&self, capacity: usize) -> (WorkerHandle, mpsc::Receiver<WorkerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (WorkerHandle::new(tx, Arc::clone(&self.state)), rx)
    }

    /// Processes jobs until a shutdown message arrives or every handle is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<WorkerMessage>) {
        info!("Sync worker started");

        let mut timer = self.sync_interval.map(|period| {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        if let Some(period) = self.sync_interval {
            info!("Automatic sync every {:?}", period);
            self.state.write().await.schedule_next_sync(period);
        }

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(WorkerMessage::Shutdown) | None => {
                            let mut state = self.state.write().await;
                            state.queued = state.queued.saturating_sub(1);
                            info!("Sync worker shutting down");
                            break;
                        }
                        Some(message) => self.handle(message).await,
                    }
                }
                () = next_tick(timer.as_mut()) => {
                    debug!("Automatic sync due");
                    self.handle_scheduled_sync().await;
                    if let Some(period) = self.sync_interval {
                        self.state.write().await.schedule_next_sync(period);
                    }
                }
            }
        }
    }

    async fn handle_scheduled_sync(&mut self) {
        self.state.write().await.queued += 1;
        self.handle(WorkerMessage::Sync(None)).await;
    }

    async fn handle(&mut self, message: WorkerMessage) {
        let description = message.describe();
        debug!("Starting job: {}", description);
        self.state.write().await.start_job(description.clone());

        let succeeded = match message {
            WorkerMessage::Download { query, pattern } => self.download(&query, &pattern).await,
            WorkerMessage::Sync(Some(query)) => self.sync_one(&query).await,
            WorkerMessage::Sync(None) => self.sync_all().await,
            WorkerMessage::Authorize { force } => self.authorize(force).await,
            WorkerMessage::CompleteAuthorization(input) => self.complete_authorization(&input).await,
            WorkerMessage::Untrack(query) => self.untrack(&query).await,
            WorkerMessage::Shutdown => true,
        };

        self.state.write().await.finish_job(succeeded);
        debug!("Finished job: {} (ok: {})", description, succeeded);
    }

    async fn download(&self, query: &str, pattern: &str) -> bool {
        let kind = QueryKind::classify(query);
        let progress = self
            .notify(&format!("⏳ Downloading {kind}: {query}"))
            .await;

        let result = self.orchestrator.download_query(query, pattern).await;
        self.retract(progress).await;

        match result {
            Ok(stats) => {
                self.notify(&format!("✅ Download finished: {}", summarize(&stats)))
                    .await;
                true
            }
            Err(e) => {
                self.notify(&failure_message("Download failed", &e)).await;
                false
            }
        }
    }

    async fn sync_one(&self, query: &str) -> bool {
        let progress = self.notify(&format!("🔄 Syncing {query}")).await;
        let result = self.orchestrator.sync_query(query).await;
        self.retract(progress).await;

        match result {
            Ok(stats) => {
                self.notify(&format!("✅ Sync finished: {}", summarize(&stats)))
                    .await;
                true
            }
            Err(e) => {
                self.notify(&failure_message("Sync failed", &e)).await;
                false
            }
        }
    }

    async fn sync_all(&self) -> bool {
        if self.orchestrator.manifest().read().queries.is_empty() {
            debug!("Nothing tracked, skipping sync");
            self.state
                .write()
                .await
                .record_sync("nothing tracked".to_owned(), 0);
            return true;
        }

        let progress = self.notify("🔄 Syncing all tracked queries").await;
        let report = self.orchestrator.sync_all().await;
        self.retract(progress).await;

        let failed = report.failed().count();
        self.state
            .write()
            .await
            .record_sync(report.to_string(), failed);

        self.notify(&report_message(&report)).await;
        failed == 0
    }

    async fn authorize(&mut self, force: bool) -> bool {
        let now = chrono::Utc::now().timestamp();
        if !force && self.orchestrator.tokens().state(now) == AuthState::Valid {
            self.notify("✅ Already authorized. Send /authorize force to connect a different account.")
                .await;
            return true;
        }

        let url = self.orchestrator.tokens_mut().begin_authorization();
        self.notify(&format!(
            "🔑 Open this link and allow access:\n{url}\n\nThen send /code followed by the address you were redirected to."
        ))
        .await;
        true
    }

    async fn complete_authorization(&mut self, input: &str) -> bool {
        match self.orchestrator.tokens_mut().complete_authorization(input).await {
            Ok(_) => {
                self.notify("✅ Spotify account connected.").await;
                true
            }
            Err(e) => {
                error!("Authorization failed: {}", e);
                self.notify(&format!("❌ Authorization failed: {e}")).await;
                false
            }
        }
    }

    async fn untrack(&self, query: &str) -> bool {
        match self.orchestrator.manifest().remove(query) {
            Ok(true) => {
                self.notify(&format!("🗑 No longer tracking {query}. Downloaded files were kept."))
                    .await;
                true
            }
            Ok(false) => {
                self.notify(&format!("{query} is not tracked.")).await;
                false
            }
            Err(e) => {
                error!("Failed to untrack {}: {}", query, e);
                self.notify(&format!("❌ Could not update the manifest: {e}"))
                    .await;
                false
            }
        }
    }

    /// Sends a notice. Delivery problems are logged and never fail a job.
    async fn notify(&self, text: &str) -> Option<MessageHandle> {
        match self.notifier.notify(text).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to send notification: {}", e);
                None
            }
        }
    }

    async fn retract(&self, handle: Option<MessageHandle>) {
        if let Some(handle) = handle {
            if let Err(e) = self.notifier.retract(handle).await {
                warn!("Failed to retract progress message: {}", e);
            }
        }
    }
}

async fn next_tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn summarize(stats: &SyncStats) -> String {
    let mut text = stats.to_string();
    if !stats.changed() {
        text.push_str(" (already up to date)");
    }
    text
}

fn failure_message(prefix: &str, error: &SyncError) -> String {
    let detail = match error {
        SyncError::Download {
            source: ProviderError::RateLimited { .. },
            ..
        } => "Spotify is rate limiting requests, try again later.".to_owned(),
        other => other.to_string(),
    };
    let mut text = format!("❌ {prefix}: {detail}");
    if error.requires_reauthorization() {
        text.push('\n');
        text.push_str(REAUTHORIZE_HINT);
    }
    text
}

fn report_message(report: &SyncReport) -> String {
    let mut text = if report.failed().next().is_none() {
        format!("✅ {report}")
    } else {
        format!("⚠️ {report}")
    };
    for (query, error) in report.failed() {
        text.push_str(&format!("\n• {query}: {error}"));
    }
    if report.needs_reauthorization() {
        text.push('\n');
        text.push_str(REAUTHORIZE_HINT);
    }
    text
}
