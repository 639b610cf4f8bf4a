// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # gridrewards Fetch
//!
//! The resilient API-access layer: everything between "fetch this period's
//! rewards" and the wire.
//!
//! ## The stack, leaves first
//!
//! - [`token::TokenStore`] - bearer-token ownership with single-flight
//!   refresh: N concurrent callers, one credential exchange
//! - [`limiter::RateLimiter`] - hourly + burst rolling windows with
//!   persisted counters
//! - [`cache::ResponseCache`] - request fingerprint to response, TTL chosen
//!   per data kind
//! - [`retry::RetryExecutor`] - bounded exponential backoff with jitter,
//!   one forced re-auth on an unauthorized response
//! - [`orchestrator::FetchOrchestrator`] - concurrent fan-out over periods,
//!   partial-failure-tolerant fan-in
//!
//! ## The boundary
//!
//! [`gateway::RewardsGateway`] is the only trait that touches the network;
//! [`client::TibberGateway`] is the production implementation. Tests swap
//! in scripted fakes and exercise the whole stack without sockets.
//!
//! ## Example
//!
//! ```ignore
//! use gridrewards_fetch::{Credentials, FetchOrchestrator, TibberGateway};
//!
//! let gateway = Arc::new(TibberGateway::new()?);
//! let credentials = Credentials::new(email, password)?;
//! let orchestrator = FetchOrchestrator::builder(gateway, credentials).build();
//! orchestrator.restore_state().await;
//!
//! let outcomes = orchestrator.fetch_standard(&home_id, Utc::now()).await;
//! ```

pub mod cache;
pub mod client;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod orchestrator;
pub mod retry;
pub mod token;

// Re-export key types at crate root

pub use cache::{CacheKey, CacheKind, CacheStats, ResponseCache};
pub use client::TibberGateway;
pub use diagnostics::{DiagnosticsSnapshot, RetryEvent, RetryLog};
pub use error::FetchError;
pub use gateway::RewardsGateway;
pub use limiter::{
    Admission, LimiterConfig, LimiterOccupancy, LimiterStateStore, RateLimiter,
    RateLimiterState,
};
pub use orchestrator::{FetchOrchestrator, FetchOrchestratorBuilder, PeriodOutcome};
pub use retry::{RetryExecutor, RetryPolicy};
pub use token::{Credentials, Token, TokenStore};
