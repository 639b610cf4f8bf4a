//! Highest-level fetch entry point.
//!
//! The orchestrator owns the whole resilience stack and fans reward-period
//! requests out across it concurrently. One period failing, stalling, or
//! being throttled never delays or poisons its siblings; the only shared
//! chokepoints are the token refresh lock and the rate-limiter counters.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use gridrewards_core::{Device, GridRewards, Home, HomeId, RewardPeriodRequest};

use crate::cache::{CacheKey, CacheKind, ResponseCache};
use crate::diagnostics::{DiagnosticsSnapshot, RetryLog};
use crate::error::FetchError;
use crate::gateway::RewardsGateway;
use crate::limiter::{LimiterConfig, LimiterStateStore, RateLimiter};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::token::{Credentials, TokenStore};

// ============================================================================
// Period Outcome
// ============================================================================

/// The terminal state of one period fetch. Failure here is data, not a
/// control-flow event: the aggregate always carries every period.
#[derive(Debug)]
pub struct PeriodOutcome {
    /// The request this outcome answers.
    pub request: RewardPeriodRequest,
    /// Reward values, or the typed failure that ended the fetch.
    pub result: Result<GridRewards, FetchError>,
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an orchestrator with explicit, injectable state.
///
/// Nothing here is a process-wide singleton: tests construct as many
/// isolated stacks as they like.
pub struct FetchOrchestratorBuilder {
    gateway: Arc<dyn RewardsGateway>,
    credentials: Credentials,
    retry_policy: RetryPolicy,
    limiter_config: LimiterConfig,
    state_store: Option<Arc<dyn LimiterStateStore>>,
    refresh_buffer: Option<Duration>,
}

impl FetchOrchestratorBuilder {
    /// Starts a builder from the two mandatory pieces.
    pub fn new(gateway: Arc<dyn RewardsGateway>, credentials: Credentials) -> Self {
        Self {
            gateway,
            credentials,
            retry_policy: RetryPolicy::default(),
            limiter_config: LimiterConfig::default(),
            state_store: None,
            refresh_buffer: None,
        }
    }

    /// Overrides the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Overrides the rate-limiter configuration.
    pub fn limiter_config(mut self, config: LimiterConfig) -> Self {
        self.limiter_config = config;
        self
    }

    /// Attaches durable storage for the rate-limiter counters.
    pub fn state_store(mut self, store: Arc<dyn LimiterStateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Overrides the token refresh buffer.
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    /// Builds the orchestrator. Call [`FetchOrchestrator::restore_state`]
    /// afterwards to load persisted limiter counters.
    pub fn build(self) -> FetchOrchestrator {
        let log = Arc::new(RetryLog::new());
        let mut token_store = TokenStore::new(
            Arc::clone(&self.gateway),
            self.credentials,
            self.retry_policy,
        );
        if let Some(buffer) = self.refresh_buffer {
            token_store = token_store.with_refresh_buffer(buffer);
        }
        let token_store = Arc::new(token_store);

        let limiter = match self.state_store {
            Some(store) => RateLimiter::with_store(self.limiter_config, store),
            None => RateLimiter::new(self.limiter_config),
        };

        let (shutdown, _) = watch::channel(false);

        FetchOrchestrator {
            gateway: self.gateway,
            retry: RetryExecutor::new(
                self.retry_policy,
                Arc::clone(&token_store),
                Arc::clone(&log),
            ),
            token_store,
            limiter: Arc::new(limiter),
            cache: Arc::new(ResponseCache::new()),
            log,
            shutdown,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Concurrent, cache-fronted, rate-limited, retrying fetch coordinator.
pub struct FetchOrchestrator {
    gateway: Arc<dyn RewardsGateway>,
    token_store: Arc<TokenStore>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    retry: RetryExecutor,
    log: Arc<RetryLog>,
    shutdown: watch::Sender<bool>,
}

impl FetchOrchestrator {
    /// Shorthand builder entry point.
    pub fn builder(
        gateway: Arc<dyn RewardsGateway>,
        credentials: Credentials,
    ) -> FetchOrchestratorBuilder {
        FetchOrchestratorBuilder::new(gateway, credentials)
    }

    /// Loads persisted rate-limiter counters. Call once at startup.
    pub async fn restore_state(&self) {
        self.limiter.restore().await;
    }

    /// Fetches every requested period concurrently and joins the results.
    ///
    /// The output always has one entry per input request; individual
    /// failures are carried, never propagated across siblings.
    #[instrument(skip(self, requests), fields(periods = requests.len()))]
    pub async fn fetch_all(&self, requests: Vec<RewardPeriodRequest>) -> Vec<PeriodOutcome> {
        info!(periods = requests.len(), "Fanning out period fetches");

        let fetches = requests.into_iter().map(|request| async move {
            let result = self.fetch_one(request.clone()).await;
            PeriodOutcome { request, result }
        });
        let outcomes = join_all(fetches).await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            info!(
                failed,
                total = outcomes.len(),
                "Fan-in complete with partial failures"
            );
        }
        outcomes
    }

    /// Convenience fan-out over the four standard periods for one home.
    pub async fn fetch_standard(
        &self,
        home_id: &HomeId,
        now: DateTime<Utc>,
    ) -> Vec<PeriodOutcome> {
        self.fetch_all(RewardPeriodRequest::standard_set(home_id, now))
            .await
    }

    /// Fetches a single period: cache, then rate limiter, then the retried
    /// network call.
    #[instrument(skip(self), fields(request = %request))]
    pub async fn fetch_one(
        &self,
        request: RewardPeriodRequest,
    ) -> Result<GridRewards, FetchError> {
        let key = CacheKey::for_rewards(&request);
        if let Some(rewards) = self.cache_lookup::<GridRewards>(&key) {
            return Ok(rewards);
        }

        let kind = CacheKind::for_request(&request, Utc::now());
        self.cancellable(self.fetch_rewards_uncached(request, &key, kind))
            .await
    }

    /// The account's homes, cached as long-lived reference data.
    pub async fn homes(&self) -> Result<Vec<Home>, FetchError> {
        let key = CacheKey::build("homes", None, &[]);
        if let Some(homes) = self.cache_lookup::<Vec<Home>>(&key) {
            return Ok(homes);
        }

        let fetch = async {
            self.limiter.acquire().await;
            let gateway = Arc::clone(&self.gateway);
            let homes = self
                .retry
                .execute(move |token| {
                    let gateway = Arc::clone(&gateway);
                    async move { gateway.homes(&token).await }
                })
                .await?;
            self.cache_store(&key, &homes, CacheKind::HomeList);
            Ok(homes)
        };
        self.cancellable(fetch).await
    }

    /// Reward-bearing devices for a home, filtered to tracked categories.
    pub async fn devices(&self, home_id: &HomeId) -> Result<Vec<Device>, FetchError> {
        let key = CacheKey::build("devices", Some(home_id.as_str()), &[]);
        if let Some(devices) = self.cache_lookup::<Vec<Device>>(&key) {
            return Ok(devices);
        }

        let fetch = async {
            self.limiter.acquire().await;
            let gateway = Arc::clone(&self.gateway);
            let home = home_id.clone();
            let devices = self
                .retry
                .execute(move |token| {
                    let gateway = Arc::clone(&gateway);
                    let home = home.clone();
                    async move { gateway.devices(&token, &home).await }
                })
                .await?;
            let tracked: Vec<Device> =
                devices.into_iter().filter(Device::is_tracked).collect();
            self.cache_store(&key, &tracked, CacheKind::DeviceList);
            Ok(tracked)
        };
        self.cancellable(fetch).await
    }

    /// Drops every cached response. Wired to the manual cache-clear command.
    pub fn clear_cache(&self) {
        info!("Clearing response cache");
        self.cache.clear();
    }

    /// Drops all cached responses for one home.
    pub fn invalidate_home(&self, home_id: &HomeId) {
        let target = home_id.as_str().to_owned();
        self.cache
            .invalidate(move |_, home| home == Some(target.as_str()));
    }

    /// Read-only observability snapshot.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            taken_at: Utc::now(),
            cache: self.cache.stats(),
            limiter: self.limiter.occupancy(),
            last_authenticated: self.token_store.last_authenticated(),
            retry_events: self.log.recent(),
        }
    }

    /// Signals shutdown. In-flight fetches resolve to
    /// [`FetchError::Cancelled`] at their next suspension point.
    pub fn shutdown(&self) {
        info!("Orchestrator shutting down, cancelling in-flight fetches");
        let _ = self.shutdown.send(true);
    }

    /// Force-writes the rate-limiter state. Call before process exit.
    pub async fn flush_state(&self) {
        self.limiter.flush().await;
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn fetch_rewards_uncached(
        &self,
        request: RewardPeriodRequest,
        key: &CacheKey,
        kind: CacheKind,
    ) -> Result<GridRewards, FetchError> {
        self.limiter.acquire().await;

        let gateway = Arc::clone(&self.gateway);
        let rewards = self
            .retry
            .execute(move |token| {
                let gateway = Arc::clone(&gateway);
                let request = request.clone();
                async move { gateway.grid_rewards(&token, &request).await }
            })
            .await?;

        self.cache_store(key, &rewards, kind);
        Ok(rewards)
    }

    /// Races a fetch against the shutdown signal.
    async fn cancellable<T>(
        &self,
        fetch: impl std::future::Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        let mut cancelled = self.shutdown.subscribe();
        if *cancelled.borrow() {
            return Err(FetchError::Cancelled);
        }
        tokio::select! {
            _ = cancelled.changed() => Err(FetchError::Cancelled),
            result = fetch => result,
        }
    }

    /// Cache read that fails open: a value that no longer deserializes is
    /// treated as a miss, never as an error.
    fn cache_lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let value = self.cache.get(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(error = %err, "Cached value unreadable, treating as miss");
                None
            }
        }
    }

    fn cache_store<T: Serialize>(&self, key: &CacheKey, value: &T, kind: CacheKind) {
        match serde_json::to_value(value) {
            Ok(json) => self.cache.put(key, json, kind),
            Err(err) => debug!(error = %err, "Skipping cache store"),
        }
    }
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
