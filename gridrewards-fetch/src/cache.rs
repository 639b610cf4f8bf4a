//! Adaptive-TTL response cache.
//!
//! Maps a request fingerprint to a cached JSON response. TTL policy is a
//! single lookup on [`CacheKind`] rather than branching at call sites, and
//! it adapts near period boundaries the same way the upstream data does:
//! current-period values move fastest right before the period closes.

use chrono::{DateTime, Datelike, Timelike, Utc};
use ring::digest::{digest, SHA256};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

use gridrewards_core::RewardPeriodRequest;

// ============================================================================
// Cache Kind
// ============================================================================

/// The kind of data a cache entry holds, which decides its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// The account's home list. Changes when someone moves house.
    HomeList,
    /// Device list for a home. Changes when hardware is added.
    DeviceList,
    /// Reward data for a period that is still accumulating day-to-day.
    CurrentPeriod,
    /// Reward data for the running month.
    MonthPeriod,
    /// Reward data for a period that closed more than a day ago.
    Historical,
}

impl CacheKind {
    /// TTL for this kind as seen from `now`.
    ///
    /// Current-period entries shrink to one minute within two hours of
    /// midnight UTC, and month entries to five minutes in the last two days
    /// of the month, when the remote values actually move.
    pub fn ttl_at(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::HomeList => Duration::from_secs(3600),
            Self::DeviceList => Duration::from_secs(1800),
            Self::CurrentPeriod => {
                if now.hour() >= 22 {
                    Duration::from_secs(60)
                } else {
                    Duration::from_secs(300)
                }
            }
            Self::MonthPeriod => {
                if now.day() >= 29 {
                    Duration::from_secs(300)
                } else {
                    Duration::from_secs(900)
                }
            }
            Self::Historical => Duration::from_secs(3600),
        }
    }

    /// Picks the kind for a reward-period request.
    pub fn for_request(request: &RewardPeriodRequest, now: DateTime<Utc>) -> Self {
        use gridrewards_core::StandardPeriod;

        if request.bounds.is_historical(now) {
            return Self::Historical;
        }
        match request.label {
            Some(StandardPeriod::CurrentDay) => Self::CurrentPeriod,
            Some(StandardPeriod::PreviousMonth) => Self::Historical,
            _ => Self::MonthPeriod,
        }
    }
}

// ============================================================================
// Cache Key
// ============================================================================

/// Collision-resistant fingerprint of a logical request.
///
/// Built from the operation name and its parameters in a fixed order, so
/// two logically identical requests always produce the same digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    op: &'static str,
    home_id: Option<String>,
}

impl CacheKey {
    /// Builds a key from an operation name and ordered parameters.
    pub fn build(
        op: &'static str,
        home_id: Option<&str>,
        params: &[(&str, &str)],
    ) -> Self {
        let mut canonical = String::from(op);
        if let Some(home) = home_id {
            let _ = write!(canonical, "|home={home}");
        }
        for (name, value) in params {
            let _ = write!(canonical, "|{name}={value}");
        }

        let hash = digest(&SHA256, canonical.as_bytes());
        let mut hex = String::with_capacity(64);
        for byte in hash.as_ref() {
            let _ = write!(hex, "{byte:02x}");
        }

        Self {
            digest: hex,
            op,
            home_id: home_id.map(str::to_owned),
        }
    }

    /// Key for a reward-period request.
    pub fn for_rewards(request: &RewardPeriodRequest) -> Self {
        Self::build(
            "grid_rewards",
            Some(request.home_id.as_str()),
            &[
                ("filter", &request.filter.to_string()),
                ("from", &request.bounds.from.to_rfc3339()),
                ("to", &request.bounds.to.to_rfc3339()),
                ("resolution", request.resolution.as_str()),
            ],
        )
    }

    /// The operation this key belongs to.
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// The home this key is scoped to, if any.
    pub fn home_id(&self) -> Option<&str> {
        self.home_id.as_deref()
    }
}

// ============================================================================
// Response Cache
// ============================================================================

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
    op: &'static str,
    home_id: Option<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

/// Cache statistics, exposed through the diagnostics snapshot.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    /// Live entries.
    pub entries: usize,
    /// Reads answered from cache.
    pub hits: u64,
    /// Reads that went to the network.
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate in percent, 0 when nothing was asked yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// In-memory response cache, safe under concurrent fetches.
///
/// Bounded by natural key cardinality (one home, a few operations, a few
/// periods), so TTL expiry is the only eviction needed.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up a key. Expiry is checked on every read; an expired entry is
    /// removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();

        let expired = {
            let entries = self.entries.read().ok()?;
            match entries.get(&key.digest) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        op = key.op,
                        age_ms = now.duration_since(entry.stored_at).as_millis() as u64,
                        "Cache hit"
                    );
                    return Some(entry.value.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            if let Ok(mut entries) = self.entries.write() {
                // Re-check under the write lock: a writer may have replaced
                // the entry since we dropped the read lock.
                if entries.get(&key.digest).is_some_and(|e| e.is_expired(now)) {
                    entries.remove(&key.digest);
                    debug!(op = key.op, "Cache entry expired");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(op = key.op, "Cache miss");
        None
    }

    /// Stores a value with the TTL its kind dictates right now.
    pub fn put(&self, key: &CacheKey, value: Value, kind: CacheKind) {
        self.put_with_ttl(key, value, kind.ttl_at(Utc::now()));
    }

    /// Stores a value with an explicit TTL.
    pub fn put_with_ttl(&self, key: &CacheKey, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
            op: key.op,
            home_id: key.home_id.clone(),
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.digest.clone(), entry);
            debug!(op = key.op, ttl_secs = ttl.as_secs(), "Cached response");
        }
    }

    /// Removes entries whose operation and home match the predicate.
    pub fn invalidate<F>(&self, predicate: F)
    where
        F: Fn(&'static str, Option<&str>) -> bool,
    {
        if let Ok(mut entries) = self.entries.write() {
            let before = entries.len();
            entries.retain(|_, entry| !predicate(entry.op, entry.home_id.as_deref()));
            let removed = before - entries.len();
            if removed > 0 {
                debug!(removed, "Invalidated cache entries");
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let count = entries.len();
            entries.clear();
            debug!(count, "Cache cleared");
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().map(|e| e.len()).unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn key(name: &'static str) -> CacheKey {
        CacheKey::build(name, Some("96a14971"), &[("from", "2025-01-01")])
    }

    #[test]
    fn test_same_request_same_key() {
        assert_eq!(key("rewards"), key("rewards"));
    }

    #[test]
    fn test_different_requests_different_keys() {
        let a = CacheKey::build("rewards", Some("a"), &[("from", "2025-01-01")]);
        let b = CacheKey::build("rewards", Some("a"), &[("from", "2025-02-01")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_read_before_ttl_returns_last_write() {
        let cache = ResponseCache::new();
        let k = key("rewards");
        cache.put_with_ttl(&k, json!({"total": 1.0}), Duration::from_secs(60));
        cache.put_with_ttl(&k, json!({"total": 2.0}), Duration::from_secs(60));
        assert_eq!(cache.get(&k), Some(json!({"total": 2.0})));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = ResponseCache::new();
        let k = key("rewards");
        cache.put_with_ttl(&k, json!(1), Duration::from_millis(0));
        assert_eq!(cache.get(&k), None);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn test_invalidate_by_home() {
        let cache = ResponseCache::new();
        let a = CacheKey::build("rewards", Some("home-a"), &[]);
        let b = CacheKey::build("rewards", Some("home-b"), &[]);
        cache.put_with_ttl(&a, json!(1), Duration::from_secs(60));
        cache.put_with_ttl(&b, json!(2), Duration::from_secs(60));

        cache.invalidate(|_, home| home == Some("home-a"));

        assert_eq!(cache.get(&a), None);
        assert_eq!(cache.get(&b), Some(json!(2)));
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = ResponseCache::new();
        cache.put_with_ttl(&key("rewards"), json!(1), Duration::from_secs(60));
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_ttl_table() {
        let midday = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(
            CacheKind::HomeList.ttl_at(midday),
            Duration::from_secs(3600)
        );
        assert_eq!(
            CacheKind::CurrentPeriod.ttl_at(midday),
            Duration::from_secs(300)
        );

        // Near midnight the current-period TTL collapses.
        let late = Utc.with_ymd_and_hms(2025, 6, 10, 23, 30, 0).unwrap();
        assert_eq!(
            CacheKind::CurrentPeriod.ttl_at(late),
            Duration::from_secs(60)
        );

        // Month-end shortens the running-month TTL.
        let month_end = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        assert_eq!(
            CacheKind::MonthPeriod.ttl_at(month_end),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        use std::sync::Arc;

        let cache = Arc::new(ResponseCache::new());
        let k = key("rewards");
        cache.put_with_ttl(&k, json!(42), Duration::from_secs(60));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let k = k.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(cache.get(&k), Some(json!(42)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().hits, 800);
    }
}
