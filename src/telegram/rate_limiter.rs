//! Pacing for outgoing chat messages.
//!
//! Telegram throttles bots that post to one chat faster than about once per
//! second. Progress notices come in bursts (notify, retract, report), so
//! every send goes through this limiter.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Enforces a minimum interval between messages.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Sleeps until the next message may go out and claims the slot.
    ///
    /// Returns how long it waited.
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut last = self.last_send.lock().await;

        let wait = last.map_or(Duration::ZERO, |at| {
            self.min_interval.saturating_sub(at.elapsed())
        });
        if !wait.is_zero() {
            debug!("Rate limiter: waiting {:?} before next message", wait);
            tokio::time::sleep(wait).await;
        }

        *last = Some(Instant::now());
        wait
    }

    /// Time left before the next message may go out.
    pub async fn time_until_allowed(&self) -> Duration {
        let last = self.last_send.lock().await;
        last.map_or(Duration::ZERO, |at| {
            self.min_interval.saturating_sub(at.elapsed())
        })
    }

    /// Honors a `retry_after` answer from Telegram.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!("Telegram asked to slow down for {} seconds", wait_seconds);
        let mut last = self.last_send.lock().await;
        tokio::time::sleep(Duration::from_secs(u64::from(wait_seconds))).await;
        *last = Some(Instant::now());
    }
}
