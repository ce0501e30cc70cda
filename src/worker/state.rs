//! Observable worker state, shared with the command handler.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Summary of the most recent full sync.
#[derive(Debug, Clone)]
pub struct LastSync {
    pub finished_at: DateTime<Utc>,
    pub summary: String,
    pub failed: usize,
}

/// What the worker is doing and has done.
///
/// Written by the worker, read by `/status`.
#[derive(Debug, Default)]
pub struct WorkerState {
    /// Description of the job being run.
    pub current_job: Option<String>,
    current_started_at: Option<Instant>,

    /// Jobs submitted but not yet picked up.
    pub queued: usize,

    pub jobs_completed: u64,
    pub jobs_failed: u64,

    pub last_sync: Option<LastSync>,

    /// When the next automatic sync fires, if enabled.
    next_sync_at: Option<Instant>,
}

impl WorkerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.current_job.is_some()
    }

    pub fn start_job(&mut self, description: String) {
        self.queued = self.queued.saturating_sub(1);
        self.current_job = Some(description);
        self.current_started_at = Some(Instant::now());
    }

    pub fn finish_job(&mut self, succeeded: bool) {
        self.current_job = None;
        self.current_started_at = None;
        if succeeded {
            self.jobs_completed += 1;
        } else {
            self.jobs_failed += 1;
        }
    }

    /// How long the current job has been running.
    #[must_use]
    pub fn current_elapsed(&self) -> Option<Duration> {
        self.current_started_at.map(|at| at.elapsed())
    }

    pub fn record_sync(&mut self, summary: String, failed: usize) {
        self.last_sync = Some(LastSync {
            finished_at: Utc::now(),
            summary,
            failed,
        });
    }

    pub fn schedule_next_sync(&mut self, after: Duration) {
        self.next_sync_at = Some(Instant::now() + after);
    }

    /// Time until the next automatic sync, `None` when auto-sync is off.
    #[must_use]
    pub fn time_until_next_sync(&self) -> Option<Duration> {
        self.next_sync_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let mut state = WorkerState::new();
        state.queued = 2;
        assert!(!state.is_busy());

        state.start_job("sync".to_owned());
        assert!(state.is_busy());
        assert_eq!(state.queued, 1);
        assert!(state.current_elapsed().is_some());

        state.finish_job(false);
        assert!(!state.is_busy());
        assert_eq!(state.jobs_failed, 1);
        assert_eq!(state.jobs_completed, 0);
    }

    #[test]
    fn test_queue_never_underflows() {
        let mut state = WorkerState::new();
        state.start_job("download".to_owned());
        assert_eq!(state.queued, 0);
    }

    #[test]
    fn test_next_sync() {
        let mut state = WorkerState::new();
        assert!(state.time_until_next_sync().is_none());

        state.schedule_next_sync(Duration::from_secs(60));
        let remaining = state.time_until_next_sync().unwrap();
        assert!(remaining <= Duration::from_secs(60));
    }
}
