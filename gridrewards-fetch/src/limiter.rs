//! Multi-tier rate limiter with persisted window state.
//!
//! Two independent rolling windows, hourly and burst, each with its own
//! capacity. A request is admitted only when both windows have room, and
//! admission increments both. Counters survive restarts through the
//! [`LimiterStateStore`] seam so an exhausted window cannot be reset by
//! bouncing the process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::FetchError;

// ============================================================================
// Configuration
// ============================================================================

/// Capacities and window lengths. Constructor parameters, not constants, so
/// tests and deployments can pick their own numbers.
#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    /// Admissions allowed per hourly window.
    pub hourly_capacity: u32,
    /// Hourly window length.
    pub hourly_window: Duration,
    /// Admissions allowed per burst window.
    pub burst_capacity: u32,
    /// Burst window length.
    pub burst_window: Duration,
    /// Minimum interval between state writes to the store.
    pub save_interval: Duration,
}

impl Default for LimiterConfig {
    /// Conservative defaults under the remote service's published
    /// 100 calls/hour limit: 80/hour with a 20-per-15-minutes burst cap.
    fn default() -> Self {
        Self {
            hourly_capacity: 80,
            hourly_window: Duration::from_secs(3600),
            burst_capacity: 20,
            burst_window: Duration::from_secs(900),
            save_interval: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Persisted State
// ============================================================================

/// The durable snapshot of both windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterState {
    /// Admissions in the current hourly window.
    pub hourly_count: u32,
    /// When the hourly window started.
    pub hourly_window_start: DateTime<Utc>,
    /// Admissions in the current burst window.
    pub burst_count: u32,
    /// When the burst window started.
    pub burst_window_start: DateTime<Utc>,
    /// When this snapshot was written.
    pub saved_at: DateTime<Utc>,
}

/// Durable storage for limiter state. Implemented by `gridrewards-store`.
#[async_trait]
pub trait LimiterStateStore: Send + Sync {
    /// Loads the last snapshot, `None` when nothing was ever saved.
    async fn load(&self) -> Result<Option<RateLimiterState>, FetchError>;

    /// Persists a snapshot.
    async fn save(&self, state: &RateLimiterState) -> Result<(), FetchError>;
}

// ============================================================================
// Admission
// ============================================================================

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Request may proceed; both counters were incremented.
    Admitted,
    /// No capacity. Wait `retry_after`, then ask again.
    Denied {
        /// Time until the nearer window frees capacity.
        retry_after: Duration,
    },
}

/// Read-only occupancy snapshot for diagnostics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LimiterOccupancy {
    /// Admissions used in the hourly window.
    pub hourly_used: u32,
    /// Hourly capacity.
    pub hourly_capacity: u32,
    /// Admissions used in the burst window.
    pub burst_used: u32,
    /// Burst capacity.
    pub burst_capacity: u32,
}

// ============================================================================
// Windows
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    capacity: u32,
    length: Duration,
    count: u32,
    window_start: DateTime<Utc>,
}

impl RateWindow {
    fn new(capacity: u32, length: Duration, now: DateTime<Utc>) -> Self {
        Self {
            capacity,
            length,
            count: 0,
            window_start: now,
        }
    }

    /// Rollover is computed from elapsed time, not a timer: once the window
    /// length has passed, the counter resets and a new window starts now.
    fn roll(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.window_start)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed >= self.length {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn has_capacity(&self) -> bool {
        self.count < self.capacity
    }

    fn time_until_free(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - self.window_start)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.length.saturating_sub(elapsed)
    }
}

// ============================================================================
// Rate Limiter
// ============================================================================

struct Inner {
    hourly: RateWindow,
    burst: RateWindow,
    last_save: Instant,
}

/// Multi-tier rate limiter shared by all concurrent fetches.
///
/// The read-then-increment sequence sits behind one mutex so two concurrent
/// callers can never both observe "capacity available" and overshoot.
pub struct RateLimiter {
    config: LimiterConfig,
    inner: Mutex<Inner>,
    store: Option<std::sync::Arc<dyn LimiterStateStore>>,
}

impl RateLimiter {
    /// Creates a limiter with no persistence.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_store_opt(config, None)
    }

    /// Creates a limiter backed by a durable state store.
    pub fn with_store(
        config: LimiterConfig,
        store: std::sync::Arc<dyn LimiterStateStore>,
    ) -> Self {
        Self::with_store_opt(config, Some(store))
    }

    fn with_store_opt(
        config: LimiterConfig,
        store: Option<std::sync::Arc<dyn LimiterStateStore>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            config,
            inner: Mutex::new(Inner {
                hourly: RateWindow::new(config.hourly_capacity, config.hourly_window, now),
                burst: RateWindow::new(config.burst_capacity, config.burst_window, now),
                last_save: Instant::now(),
            }),
            store,
        }
    }

    /// Loads persisted counters, if any. Call once at startup; a missing or
    /// unreadable snapshot leaves the limiter at full capacity.
    pub async fn restore(&self) {
        let Some(store) = &self.store else { return };
        match store.load().await {
            Ok(Some(state)) => {
                self.apply_state(&state);
                debug!(
                    hourly = state.hourly_count,
                    burst = state.burst_count,
                    "Restored rate limiter state"
                );
            }
            Ok(None) => debug!("No persisted rate limiter state"),
            Err(err) => warn!(error = %err, "Failed to restore rate limiter state"),
        }
    }

    /// Applies a snapshot directly. Windows that elapsed while the process
    /// was down reset naturally on the next admission check.
    pub fn apply_state(&self, state: &RateLimiterState) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.hourly.count = state.hourly_count.min(self.config.hourly_capacity);
            inner.hourly.window_start = state.hourly_window_start;
            inner.burst.count = state.burst_count.min(self.config.burst_capacity);
            inner.burst.window_start = state.burst_window_start;
        }
    }

    /// Single admission attempt. Never blocks; denial never mutates counters.
    pub async fn try_acquire(&self) -> Admission {
        let (admission, due_save) = self.admit(Utc::now());
        if let Some(state) = due_save {
            self.persist(&state).await;
        }
        admission
    }

    /// Admission that waits out denials. Returns once admitted.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Admission::Admitted => return,
                Admission::Denied { retry_after } => {
                    debug!(
                        wait_ms = retry_after.as_millis() as u64,
                        "Rate limit reached, waiting"
                    );
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    /// Current occupancy after rolling both windows.
    pub fn occupancy(&self) -> LimiterOccupancy {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.hourly.roll(now);
        inner.burst.roll(now);
        LimiterOccupancy {
            hourly_used: inner.hourly.count,
            hourly_capacity: self.config.hourly_capacity,
            burst_used: inner.burst.count,
            burst_capacity: self.config.burst_capacity,
        }
    }

    /// Snapshot of the current state, for persistence.
    pub fn snapshot(&self) -> RateLimiterState {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        RateLimiterState {
            hourly_count: inner.hourly.count,
            hourly_window_start: inner.hourly.window_start,
            burst_count: inner.burst.count,
            burst_window_start: inner.burst.window_start,
            saved_at: Utc::now(),
        }
    }

    /// Forces a state write, regardless of the save interval. Used on
    /// shutdown so the last window counts are not lost.
    pub async fn flush(&self) {
        let state = self.snapshot();
        self.persist(&state).await;
    }

    /// The read-then-increment core. Returns the admission decision and, on
    /// admission, a snapshot to persist when the save interval has passed.
    fn admit(&self, now: DateTime<Utc>) -> (Admission, Option<RateLimiterState>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        inner.hourly.roll(now);
        inner.burst.roll(now);

        if !inner.hourly.has_capacity() || !inner.burst.has_capacity() {
            // The nearer of the two exhausted windows decides the wait.
            let mut retry_after = Duration::MAX;
            if !inner.hourly.has_capacity() {
                retry_after = retry_after.min(inner.hourly.time_until_free(now));
            }
            if !inner.burst.has_capacity() {
                retry_after = retry_after.min(inner.burst.time_until_free(now));
            }
            return (Admission::Denied { retry_after }, None);
        }

        inner.hourly.count += 1;
        inner.burst.count += 1;

        let due_save = self.store.is_some()
            && inner.last_save.elapsed() >= self.config.save_interval;
        if due_save {
            inner.last_save = Instant::now();
            let state = RateLimiterState {
                hourly_count: inner.hourly.count,
                hourly_window_start: inner.hourly.window_start,
                burst_count: inner.burst.count,
                burst_window_start: inner.burst.window_start,
                saved_at: now,
            };
            return (Admission::Admitted, Some(state));
        }

        (Admission::Admitted, None)
    }

    async fn persist(&self, state: &RateLimiterState) {
        let Some(store) = &self.store else { return };
        if let Err(err) = store.save(state).await {
            // Persistence is best-effort; limiting keeps working in memory.
            debug!(error = %err, "Failed to save rate limiter state");
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("persisted", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
