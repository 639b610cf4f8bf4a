//! Bounded retry with exponential backoff and jitter.
//!
//! The executor wraps exactly one network operation. Transient failures
//! back off exponentially with jitter; an unauthorized response forces one
//! token refresh outside the backoff count; rate-limit signals are waited
//! out without consuming an attempt.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::diagnostics::RetryLog;
use crate::error::FetchError;
use crate::token::{Token, TokenStore};

/// Upper bound on consecutive rate-limit waits within one call, so a
/// persistently throttling server cannot pin a fetch forever.
const MAX_RATE_LIMIT_WAITS: u32 = 3;

// ============================================================================
// Retry Policy
// ============================================================================

/// Immutable backoff configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts before surfacing exhaustion.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Jitter scale: each delay is multiplied by a random factor in
    /// `[1 - ratio, 1 + ratio]`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_ratio: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Sets the attempt bound.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay ceiling.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// The unjittered delay for a 0-based attempt: `base * 2^attempt`,
    /// capped at `max_delay`.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// The jittered delay for a 0-based attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Jitter with a caller-supplied RNG, for deterministic tests.
    pub fn delay_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let raw = self.raw_delay(attempt);
        let factor = rng.gen_range(1.0 - self.jitter_ratio..=1.0 + self.jitter_ratio);
        raw.mul_f64(factor.max(0.0))
    }
}

// ============================================================================
// Retry Executor
// ============================================================================

/// Wraps a single token-parameterized network operation with the retry,
/// re-authentication, and rate-limit-wait policy.
pub struct RetryExecutor {
    policy: RetryPolicy,
    token_store: Arc<TokenStore>,
    log: Arc<RetryLog>,
}

impl RetryExecutor {
    /// Creates an executor.
    pub fn new(policy: RetryPolicy, token_store: Arc<TokenStore>, log: Arc<RetryLog>) -> Self {
        Self {
            policy,
            token_store,
            log,
        }
    }

    /// Runs `op` to completion under the retry policy.
    ///
    /// `op` receives a token guaranteed valid for the refresh buffer and
    /// must perform exactly one network round-trip. Operations are
    /// idempotent reads, so a retry is a plain re-issue.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, FetchError>
    where
        F: Fn(Token) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt: u32 = 0;
        let mut refreshed = false;
        let mut rate_limit_waits: u32 = 0;

        loop {
            let token = self.token_store.valid_token().await?;

            match op(token).await {
                Ok(value) => return Ok(value),

                Err(FetchError::Unauthorized) if !refreshed => {
                    // The remote side rejected a token that looked valid
                    // locally. One forced refresh, then one more try,
                    // outside the backoff count.
                    refreshed = true;
                    warn!("Token rejected mid-flight, forcing refresh");
                    self.log.record(attempt, Duration::ZERO, "unauthorized");
                    self.token_store.force_refresh().await?;
                }

                Err(err @ FetchError::Unauthorized) => {
                    warn!("Token rejected again after forced refresh");
                    return Err(err);
                }

                Err(FetchError::RateLimited { retry_after })
                    if rate_limit_waits < MAX_RATE_LIMIT_WAITS =>
                {
                    rate_limit_waits += 1;
                    debug!(
                        wait_ms = retry_after.as_millis() as u64,
                        "Remote rate limit, waiting without consuming an attempt"
                    );
                    self.log.record(attempt, retry_after, "rate_limited");
                    tokio::time::sleep(retry_after).await;
                }

                Err(err @ FetchError::RateLimited { .. }) => return Err(err),

                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            attempts = attempt,
                            error = %err,
                            "Retry budget exhausted"
                        );
                        return Err(FetchError::RetryExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.policy.delay_for_attempt(attempt - 1);
                    warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, backing off"
                    );
                    self.log.record(attempt, delay, err.kind());
                    tokio::time::sleep(delay).await;
                }

                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_raw_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.raw_delay(0), Duration::from_secs(1));
        assert_eq!(policy.raw_delay(1), Duration::from_secs(2));
        assert_eq!(policy.raw_delay(2), Duration::from_secs(4));
        assert_eq!(policy.raw_delay(10), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..6 {
            let raw = policy.raw_delay(attempt);
            let jittered = policy.delay_with_rng(attempt, &mut rng);
            assert!(jittered >= raw.mul_f64(1.0 - policy.jitter_ratio));
            assert!(jittered <= raw.mul_f64(1.0 + policy.jitter_ratio));
        }
    }

    #[test]
    fn test_raw_delays_non_decreasing() {
        let policy = RetryPolicy::default().with_max_attempts(10);
        let mut previous = Duration::ZERO;
        for attempt in 0..10 {
            let delay = policy.raw_delay(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_max_attempts_floor_is_one() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
    }
}
