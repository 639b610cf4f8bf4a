//! Durable rate-limiter counters.
//!
//! The remote quota is enforced per account, not per process, so the
//! limiter windows must survive restarts. This file-backed store is the
//! production implementation of the fetch crate's persistence seam.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

use gridrewards_fetch::{FetchError, LimiterStateStore, RateLimiterState};

use crate::persistence::{self, default_limiter_state_path};

/// JSON-file implementation of [`LimiterStateStore`].
///
/// A missing or corrupt file is never fatal: the limiter starts from
/// empty windows, which over-admits at worst one window's worth.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Creates a store at the platform default location.
    pub fn new() -> Self {
        Self {
            path: default_limiter_state_path(),
        }
    }

    /// Creates a store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FileStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LimiterStateStore for FileStateStore {
    async fn load(&self) -> Result<Option<RateLimiterState>, FetchError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No limiter state file, starting fresh");
            return Ok(None);
        }

        match persistence::load_json::<RateLimiterState>(&self.path).await {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Limiter state unreadable, starting fresh"
                );
                Ok(None)
            }
        }
    }

    async fn save(&self, state: &RateLimiterState) -> Result<(), FetchError> {
        persistence::save_json(&self.path, state)
            .await
            .map_err(|e| FetchError::Store(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_state() -> RateLimiterState {
        let now = Utc::now();
        RateLimiterState {
            hourly_count: 42,
            hourly_window_start: now,
            burst_count: 5,
            burst_window_start: now,
            saved_at: now,
        }
    }

    #[tokio::test]
    async fn round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::at(dir.path().join("limiter.json"));

        store.save(&sample_state()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.hourly_count, 42);
        assert_eq!(loaded.burst_count, 5);
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::at(dir.path().join("absent.json"));

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limiter.json");
        tokio::fs::write(&path, "][").await.unwrap();

        let store = FileStateStore::at(&path);
        assert!(store.load().await.unwrap().is_none());
    }
}
