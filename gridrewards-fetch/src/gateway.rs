//! The outbound boundary to the remote service.
//!
//! Everything above this trait (retry, caching, rate limiting, the
//! orchestrator) is remote-agnostic. The production implementation is
//! [`crate::client::TibberGateway`]; tests substitute scripted fakes.

use async_trait::async_trait;

use gridrewards_core::{Device, GridRewards, Home, HomeId, RewardPeriodRequest};

use crate::error::FetchError;
use crate::token::{Credentials, Token};

/// A single-shot connection to the remote rewards service.
///
/// Implementations perform exactly one network round-trip per call and do
/// not retry; retry and backoff live in [`crate::retry::RetryExecutor`].
#[async_trait]
pub trait RewardsGateway: Send + Sync {
    /// Exchanges credentials for a bearer token and its expiry.
    ///
    /// A rejection of the credentials themselves must surface as
    /// [`FetchError::CredentialsInvalid`]; transport problems as their
    /// transient variants.
    async fn exchange_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Token, FetchError>;

    /// Lists the homes on the account.
    async fn homes(&self, token: &Token) -> Result<Vec<Home>, FetchError>;

    /// Lists the devices attached to a home.
    async fn devices(
        &self,
        token: &Token,
        home_id: &HomeId,
    ) -> Result<Vec<Device>, FetchError>;

    /// Fetches grid rewards for one period. A token rejected by the remote
    /// service must surface as [`FetchError::Unauthorized`] and an explicit
    /// throttle signal as [`FetchError::RateLimited`].
    async fn grid_rewards(
        &self,
        token: &Token,
        request: &RewardPeriodRequest,
    ) -> Result<GridRewards, FetchError>;
}
