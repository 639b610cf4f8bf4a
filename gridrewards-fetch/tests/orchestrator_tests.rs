//! End-to-end tests for the fetch stack against a scripted gateway.
//!
//! No sockets: the fake gateway stands in for the remote service and counts
//! every call, which is exactly what the resilience guarantees are about.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gridrewards_core::{
    Device, GridRewards, Home, HomeId, RewardPeriodRequest, StandardPeriod,
};
use gridrewards_fetch::{
    Credentials, FetchError, FetchOrchestrator, LimiterConfig, LimiterStateStore,
    RateLimiterState, RetryPolicy, RewardsGateway, Token, TokenStore,
};

// ============================================================================
// Fake Gateway
// ============================================================================

/// How the fake should answer reward queries for a given period.
#[derive(Debug, Clone, Copy)]
enum FailMode {
    /// Always a 5xx.
    AlwaysServer,
    /// One 401, then success.
    UnauthorizedOnce,
    /// Sleep this long before answering, to give cancellation a window.
    Slow(Duration),
}

#[derive(Default)]
struct FakeGateway {
    exchange_calls: AtomicU32,
    query_calls: AtomicU32,
    reject_credentials: bool,
    auth_delay: Duration,
    fail_modes: Mutex<HashMap<StandardPeriod, FailMode>>,
    unauthorized_fired: AtomicBool,
}

impl FakeGateway {
    fn new() -> Self {
        Self::default()
    }

    fn failing(period: StandardPeriod, mode: FailMode) -> Self {
        let gateway = Self::new();
        gateway.fail_modes.lock().unwrap().insert(period, mode);
        gateway
    }

    fn rewards_for(&self, request: &RewardPeriodRequest) -> GridRewards {
        GridRewards {
            ev: Some(10.0),
            battery: Some(5.0),
            total: Some(15.0),
            currency: Some("SEK".to_string()),
            period_from: Some(request.bounds.from.to_rfc3339()),
            period_to: Some(request.bounds.to.to_rfc3339()),
        }
    }
}

#[async_trait]
impl RewardsGateway for FakeGateway {
    async fn exchange_credentials(
        &self,
        _credentials: &Credentials,
    ) -> Result<Token, FetchError> {
        if self.auth_delay > Duration::ZERO {
            tokio::time::sleep(self.auth_delay).await;
        }
        if self.reject_credentials {
            return Err(FetchError::CredentialsInvalid);
        }
        let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Token {
            value: format!("tok-{n}"),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        })
    }

    async fn homes(&self, _token: &Token) -> Result<Vec<Home>, FetchError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![serde_json::from_value(serde_json::json!({
            "id": "96a14971-525a-4420-aae9-e5aedaa129ff",
            "timeZone": "Europe/Stockholm"
        }))
        .unwrap()])
    }

    async fn devices(
        &self,
        _token: &Token,
        _home_id: &HomeId,
    ) -> Result<Vec<Device>, FetchError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }

    async fn grid_rewards(
        &self,
        _token: &Token,
        request: &RewardPeriodRequest,
    ) -> Result<GridRewards, FetchError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        let mode = request
            .label
            .and_then(|label| self.fail_modes.lock().unwrap().get(&label).copied());
        match mode {
            Some(FailMode::AlwaysServer) => Err(FetchError::Server { status: 502 }),
            Some(FailMode::UnauthorizedOnce) => {
                if self.unauthorized_fired.swap(true, Ordering::SeqCst) {
                    Ok(self.rewards_for(request))
                } else {
                    Err(FetchError::Unauthorized)
                }
            }
            Some(FailMode::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(self.rewards_for(request))
            }
            None => Ok(self.rewards_for(request)),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn home() -> HomeId {
    HomeId::new("96a14971-525a-4420-aae9-e5aedaa129ff").unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("user@example.com", "secret").unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::default().with_base_delay(Duration::from_millis(1))
}

fn wide_open_limiter() -> LimiterConfig {
    LimiterConfig {
        hourly_capacity: 1000,
        hourly_window: Duration::from_secs(3600),
        burst_capacity: 1000,
        burst_window: Duration::from_secs(900),
        save_interval: Duration::from_secs(60),
    }
}

fn orchestrator_with(gateway: Arc<FakeGateway>) -> FetchOrchestrator {
    FetchOrchestrator::builder(gateway, credentials())
        .retry_policy(fast_policy())
        .limiter_config(wide_open_limiter())
        .build()
}

/// In-memory state store for restart tests.
#[derive(Default)]
struct MemoryStateStore {
    state: Mutex<Option<RateLimiterState>>,
}

#[async_trait]
impl LimiterStateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<RateLimiterState>, FetchError> {
        Ok(*self.state.lock().unwrap())
    }

    async fn save(&self, state: &RateLimiterState) -> Result<(), FetchError> {
        *self.state.lock().unwrap() = Some(*state);
        Ok(())
    }
}

// ============================================================================
// Single-flight authentication
// ============================================================================

#[tokio::test]
async fn concurrent_callers_share_one_token_exchange() {
    let gateway = Arc::new(FakeGateway {
        auth_delay: Duration::from_millis(30),
        ..FakeGateway::default()
    });
    let store = Arc::new(TokenStore::new(
        gateway.clone() as Arc<dyn RewardsGateway>,
        credentials(),
        fast_policy(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.valid_token().await.unwrap().value })
        })
        .collect();

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap());
    }

    assert_eq!(gateway.exchange_calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| v == "tok-1"));
}

#[tokio::test]
async fn bad_credentials_are_not_retried() {
    let gateway = Arc::new(FakeGateway {
        reject_credentials: true,
        ..FakeGateway::default()
    });
    let orchestrator = orchestrator_with(gateway.clone());

    let request = RewardPeriodRequest::standard(home(), StandardPeriod::CurrentMonth, Utc::now());
    let result = orchestrator.fetch_one(request).await;

    assert!(matches!(result, Err(FetchError::CredentialsInvalid)));
    assert_eq!(gateway.query_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Fan-out / fan-in
// ============================================================================

#[tokio::test]
async fn one_failing_period_does_not_poison_siblings() {
    let gateway = Arc::new(FakeGateway::failing(
        StandardPeriod::PreviousMonth,
        FailMode::AlwaysServer,
    ));
    let orchestrator = orchestrator_with(gateway);

    let outcomes = orchestrator.fetch_standard(&home(), Utc::now()).await;
    assert_eq!(outcomes.len(), 4);

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(rewards) => assert_eq!(rewards.total, Some(15.0)),
            Err(FetchError::RetryExhausted { attempts, .. }) => {
                assert_eq!(outcome.request.label, Some(StandardPeriod::PreviousMonth));
                assert_eq!(*attempts, 3);
                failed += 1;
            }
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert_eq!(failed, 1);
}

// ============================================================================
// Cache behavior
// ============================================================================

#[tokio::test]
async fn second_fetch_within_ttl_makes_no_network_calls() {
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator_with(gateway.clone());

    let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
    let request = RewardPeriodRequest::standard(home(), StandardPeriod::CurrentDay, now);

    let first = orchestrator.fetch_one(request.clone()).await.unwrap();
    assert_eq!(gateway.exchange_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.query_calls.load(Ordering::SeqCst), 1);

    let second = orchestrator.fetch_one(request).await.unwrap();
    assert_eq!(second, first);
    // Still one auth and one query: the cache absorbed the repeat.
    assert_eq!(gateway.exchange_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.query_calls.load(Ordering::SeqCst), 1);

    let diag = orchestrator.diagnostics();
    assert_eq!(diag.cache.hits, 1);
    assert_eq!(diag.cache.misses, 1);
}

#[tokio::test]
async fn clear_cache_forces_refetch() {
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator_with(gateway.clone());
    let request = RewardPeriodRequest::standard(home(), StandardPeriod::CurrentMonth, Utc::now());

    orchestrator.fetch_one(request.clone()).await.unwrap();
    orchestrator.clear_cache();
    orchestrator.fetch_one(request).await.unwrap();

    assert_eq!(gateway.query_calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn exhausted_burst_window_delays_but_does_not_fail() {
    let gateway = Arc::new(FakeGateway::new());
    let limiter = LimiterConfig {
        hourly_capacity: 100,
        hourly_window: Duration::from_secs(3600),
        burst_capacity: 2,
        burst_window: Duration::from_millis(200),
        save_interval: Duration::from_secs(60),
    };
    let orchestrator = FetchOrchestrator::builder(gateway, credentials())
        .retry_policy(fast_policy())
        .limiter_config(limiter)
        .build();

    let now = Utc::now();
    let start = Instant::now();
    // Three distinct periods: the third must wait for the burst window.
    for period in [
        StandardPeriod::CurrentMonth,
        StandardPeriod::PreviousMonth,
        StandardPeriod::YearToDate,
    ] {
        let request = RewardPeriodRequest::standard(home(), period, now);
        orchestrator.fetch_one(request).await.unwrap();
    }

    assert!(start.elapsed() >= Duration::from_millis(150));
    let occupancy = orchestrator.diagnostics().limiter;
    assert!(occupancy.burst_used <= occupancy.burst_capacity);
}

#[tokio::test]
async fn limiter_state_survives_restart() {
    let store = Arc::new(MemoryStateStore::default());
    let now = Utc::now();
    store
        .save(&RateLimiterState {
            hourly_count: 58,
            hourly_window_start: now,
            burst_count: 0,
            burst_window_start: now,
            saved_at: now,
        })
        .await
        .unwrap();

    let gateway = Arc::new(FakeGateway::new());
    let limiter = LimiterConfig {
        hourly_capacity: 60,
        hourly_window: Duration::from_secs(3600),
        burst_capacity: 60,
        burst_window: Duration::from_secs(3600),
        save_interval: Duration::from_secs(60),
    };
    let orchestrator = FetchOrchestrator::builder(gateway, credentials())
        .retry_policy(fast_policy())
        .limiter_config(limiter)
        .state_store(store)
        .build();
    orchestrator.restore_state().await;

    // 58 of 60 were used before the "restart": exactly 2 remain.
    let occupancy = orchestrator.diagnostics().limiter;
    assert_eq!(occupancy.hourly_used, 58);

    let now = Utc::now();
    let a = RewardPeriodRequest::standard(home(), StandardPeriod::CurrentMonth, now);
    let b = RewardPeriodRequest::standard(home(), StandardPeriod::PreviousMonth, now);
    orchestrator.fetch_one(a).await.unwrap();
    orchestrator.fetch_one(b).await.unwrap();
    assert_eq!(orchestrator.diagnostics().limiter.hourly_used, 60);
}

// ============================================================================
// Forced refresh on 401
// ============================================================================

#[tokio::test]
async fn unauthorized_response_forces_exactly_one_refresh() {
    let gateway = Arc::new(FakeGateway::failing(
        StandardPeriod::CurrentMonth,
        FailMode::UnauthorizedOnce,
    ));
    let orchestrator = orchestrator_with(gateway.clone());

    let request = RewardPeriodRequest::standard(home(), StandardPeriod::CurrentMonth, Utc::now());
    let rewards = orchestrator.fetch_one(request).await.unwrap();

    assert_eq!(rewards.total, Some(15.0));
    // Initial exchange plus the forced refresh, nothing more.
    assert_eq!(gateway.exchange_calls.load(Ordering::SeqCst), 2);
    assert_eq!(gateway.query_calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn shutdown_cancels_in_flight_fetches() {
    let gateway = Arc::new(FakeGateway::failing(
        StandardPeriod::CurrentMonth,
        FailMode::Slow(Duration::from_secs(5)),
    ));
    let orchestrator = Arc::new(orchestrator_with(gateway));

    let request = RewardPeriodRequest::standard(home(), StandardPeriod::CurrentMonth, Utc::now());
    let fetcher = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.fetch_one(request).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.shutdown();

    let result = fetcher.await.unwrap();
    assert!(matches!(result, Err(FetchError::Cancelled)));
}

// ============================================================================
// Inventory queries
// ============================================================================

#[tokio::test]
async fn homes_are_cached_as_reference_data() {
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator_with(gateway.clone());

    let first = orchestrator.homes().await.unwrap();
    let second = orchestrator.homes().await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(gateway.query_calls.load(Ordering::SeqCst), 1);
}
