//! Bearer-token ownership and concurrency-safe refresh.
//!
//! The [`TokenStore`] is the only place a token lives. Every caller goes
//! through [`TokenStore::valid_token`], which guarantees at most one
//! credential exchange per expiry cycle no matter how many concurrent
//! fetches observe an invalid token at the same moment.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::gateway::RewardsGateway;
use crate::retry::RetryPolicy;

/// Safety margin subtracted from the expiry instant so a token is never used
/// when it could expire mid-flight.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// Credentials
// ============================================================================

/// Login credentials for the remote service. Never persisted by this crate.
#[derive(Clone)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials, rejecting obviously malformed input before any
    /// network round-trip happens.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self, FetchError> {
        let email = email.into();
        let password = password.into();
        if !email.contains('@') {
            return Err(FetchError::CredentialsInvalid);
        }
        if password.is_empty() {
            return Err(FetchError::CredentialsInvalid);
        }
        Ok(Self { email, password })
    }
}

impl fmt::Debug for Credentials {
    /// The password never reaches logs, not even through `{:?}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Token
// ============================================================================

/// A bearer token and the instant it stops being usable.
#[derive(Clone)]
pub struct Token {
    /// The token value. Only ever read when building a request header.
    pub value: String,
    /// Wall-clock expiry reported (or assumed) at exchange time.
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// True if the token is still good for at least `buffer` from `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        let buffer = ChronoDuration::from_std(buffer).unwrap_or(ChronoDuration::zero());
        now < self.expires_at - buffer
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ============================================================================
// Token Store
// ============================================================================

/// Owns the current token and serializes refresh across concurrent callers.
///
/// Refresh is a guarded double-check: the fast path reads the token under a
/// `RwLock` with no async lock involved; only callers that find it invalid
/// contend on the refresh mutex, and the first one through re-checks before
/// spending a network round-trip. Everyone waiting behind it observes the
/// token it stored.
pub struct TokenStore {
    gateway: Arc<dyn RewardsGateway>,
    credentials: Credentials,
    refresh_buffer: Duration,
    policy: RetryPolicy,
    current: RwLock<Option<Token>>,
    refresh_lock: Mutex<()>,
    last_authenticated: StdMutex<Option<DateTime<Utc>>>,
}

impl TokenStore {
    /// Creates a store with the default refresh buffer.
    pub fn new(
        gateway: Arc<dyn RewardsGateway>,
        credentials: Credentials,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            credentials,
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            policy,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            last_authenticated: StdMutex::new(None),
        }
    }

    /// Overrides the refresh buffer.
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Returns a token guaranteed valid for at least the refresh buffer,
    /// exchanging credentials at most once per expiry cycle.
    pub async fn valid_token(&self) -> Result<Token, FetchError> {
        // Fast path: no async lock when the token is still good.
        if let Some(token) = self.read_valid() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Re-check: another caller may have refreshed while we waited.
        if let Some(token) = self.read_valid() {
            debug!("Using token refreshed by a concurrent caller");
            return Ok(token);
        }

        self.exchange().await
    }

    /// Drops the current token and performs a fresh exchange.
    ///
    /// Used by the retry executor when the remote service rejects a token
    /// that still looked valid locally.
    pub async fn force_refresh(&self) -> Result<Token, FetchError> {
        let _guard = self.refresh_lock.lock().await;
        if let Ok(mut current) = self.current.write() {
            *current = None;
        }
        self.exchange().await
    }

    /// When the last successful authentication happened, for diagnostics.
    pub fn last_authenticated(&self) -> Option<DateTime<Utc>> {
        self.last_authenticated.lock().ok().and_then(|t| *t)
    }

    fn read_valid(&self) -> Option<Token> {
        let current = self.current.read().ok()?;
        let token = current.as_ref()?;
        token
            .is_valid_at(Utc::now(), self.refresh_buffer)
            .then(|| token.clone())
    }

    /// Performs the credential exchange. Must be called with the refresh
    /// lock held. Network failures retry within the standard policy; a
    /// credential rejection aborts immediately.
    async fn exchange(&self) -> Result<Token, FetchError> {
        info!("Token missing or expiring, authenticating");

        let mut attempt: u32 = 0;
        loop {
            match self.gateway.exchange_credentials(&self.credentials).await {
                Ok(token) => {
                    info!(expires_at = %token.expires_at, "Authentication succeeded");
                    if let Ok(mut current) = self.current.write() {
                        *current = Some(token.clone());
                    }
                    if let Ok(mut last) = self.last_authenticated.lock() {
                        *last = Some(Utc::now());
                    }
                    return Ok(token);
                }
                Err(FetchError::CredentialsInvalid) => {
                    warn!("Remote service rejected credentials");
                    return Err(FetchError::CredentialsInvalid);
                }
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        return Err(FetchError::RetryExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.policy.delay_for_attempt(attempt - 1);
                    warn!(
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        attempt,
                        "Authentication network error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("email", &self.credentials.email)
            .field("refresh_buffer", &self.refresh_buffer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_validation() {
        assert!(Credentials::new("user@example.com", "secret").is_ok());
        assert!(Credentials::new("not-an-email", "secret").is_err());
        assert!(Credentials::new("user@example.com", "").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("user@example.com", "hunter2").unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("user@example.com"));
    }

    #[test]
    fn test_token_debug_redacts_value() {
        let token = Token {
            value: "tok-abc123".to_string(),
            expires_at: Utc::now(),
        };
        assert!(!format!("{token:?}").contains("tok-abc123"));
    }

    #[test]
    fn test_token_validity_respects_buffer() {
        let now = Utc::now();
        let token = Token {
            value: "t".to_string(),
            expires_at: now + ChronoDuration::minutes(15),
        };
        // Valid with a 10 minute buffer, invalid with a 20 minute buffer.
        assert!(token.is_valid_at(now, Duration::from_secs(600)));
        assert!(!token.is_valid_at(now, Duration::from_secs(1200)));
    }
}
