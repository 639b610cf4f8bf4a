//! Read-only observability surface.
//!
//! Everything here is a snapshot: diagnostics consumers get copies, never
//! handles into live state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::CacheStats;
use crate::limiter::LimiterOccupancy;

/// How many retry/backoff events the log keeps.
const RETRY_LOG_CAPACITY: usize = 32;

// ============================================================================
// Retry Events
// ============================================================================

/// One recorded retry or backoff decision.
#[derive(Debug, Clone, Serialize)]
pub struct RetryEvent {
    /// When the decision was made.
    pub at: DateTime<Utc>,
    /// Attempt number the delay applies to (0-based).
    pub attempt: u32,
    /// How long the executor decided to wait.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    /// Short reason tag, e.g. "server" or "rate_limited".
    pub reason: &'static str,
}

/// Bounded ring buffer of recent retry events, shared across fetches.
#[derive(Debug, Default)]
pub struct RetryLog {
    events: Mutex<VecDeque<RetryEvent>>,
}

impl RetryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event, evicting the oldest once full.
    pub fn record(&self, attempt: u32, delay: Duration, reason: &'static str) {
        if let Ok(mut events) = self.events.lock() {
            if events.len() == RETRY_LOG_CAPACITY {
                events.pop_front();
            }
            events.push_back(RetryEvent {
                at: Utc::now(),
                attempt,
                delay,
                reason,
            });
        }
    }

    /// Copies out the recorded events, oldest first.
    pub fn recent(&self) -> Vec<RetryEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Diagnostics Snapshot
// ============================================================================

/// The full observability snapshot exported by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Cache hit/miss counts and live entries.
    pub cache: CacheStats,
    /// Current rate-limiter window occupancy.
    pub limiter: LimiterOccupancy,
    /// Last successful authentication, if any.
    pub last_authenticated: Option<DateTime<Utc>>,
    /// Recent retry/backoff events.
    pub retry_events: Vec<RetryEvent>,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let log = RetryLog::new();
        for attempt in 0..100 {
            log.record(attempt, Duration::from_millis(10), "server");
        }
        let events = log.recent();
        assert_eq!(events.len(), RETRY_LOG_CAPACITY);
        // Oldest entries were evicted.
        assert_eq!(events.first().unwrap().attempt, 100 - RETRY_LOG_CAPACITY as u32);
    }

    #[test]
    fn test_events_serialize() {
        let log = RetryLog::new();
        log.record(1, Duration::from_millis(250), "rate_limited");
        let json = serde_json::to_string(&log.recent()).unwrap();
        assert!(json.contains("rate_limited"));
        assert!(json.contains("250"));
    }
}
