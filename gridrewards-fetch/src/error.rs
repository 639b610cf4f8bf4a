//! Fetch error taxonomy.
//!
//! The variants split along one axis: what the caller should do next.
//! `CredentialsInvalid` needs an operator; `RateLimited` is a scheduling
//! signal; transient variants self-heal on a later tick.

use std::time::Duration;
use thiserror::Error;

/// Error type for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote service rejected the credentials themselves. Fatal for the
    /// session, never retried.
    #[error("Credentials rejected by the remote service")]
    CredentialsInvalid,

    /// The bearer token was rejected mid-flight. Triggers one forced refresh.
    #[error("Unauthorized: token expired or revoked")]
    Unauthorized,

    /// Rate limited, either locally or by the remote service.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long to wait before the next attempt.
        retry_after: Duration,
    },

    /// Transport-level failure (connect, TLS, read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Remote server error (5xx).
    #[error("Server error: HTTP {status}")]
    Server {
        /// Status code returned by the server.
        status: u16,
    },

    /// Response did not match the expected shape, or carried GraphQL errors.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// All retry attempts were consumed.
    #[error("Retry exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Attempts made before giving up.
        attempts: u32,
        /// The last underlying failure.
        #[source]
        source: Box<FetchError>,
    },

    /// The fetch was cancelled by shutdown, not by an API fault.
    #[error("Fetch cancelled")]
    Cancelled,

    /// Durable-state backend failure.
    #[error("State store error: {0}")]
    Store(String),

    /// Core validation error.
    #[error("Core error: {0}")]
    Core(#[from] gridrewards_core::CoreError),
}

impl FetchError {
    /// True if a retry with backoff can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout(_) | Self::Server { .. }
        )
    }

    /// Short tag used in diagnostics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialsInvalid => "credentials_invalid",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::Http(_) => "http",
            Self::Timeout(_) => "timeout",
            Self::Server { .. } => "server",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Json(_) => "json",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Cancelled => "cancelled",
            Self::Store(_) => "store",
            Self::Core(_) => "core",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Server { status: 503 }.is_transient());
        assert!(FetchError::Timeout(Duration::from_secs(20)).is_transient());
        assert!(!FetchError::CredentialsInvalid.is_transient());
        assert!(!FetchError::Unauthorized.is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn test_exhaustion_carries_cause() {
        let err = FetchError::RetryExhausted {
            attempts: 3,
            source: Box::new(FetchError::Server { status: 502 }),
        };
        assert!(err.to_string().contains("502"));
        assert_eq!(err.kind(), "retry_exhausted");
    }
}
