//! Production gateway for the Tibber app API.
//!
//! Single-shot calls only: all retry, caching, and rate limiting live a
//! layer up. Two endpoints exist, an undocumented credential-login endpoint
//! and the GraphQL endpoint the vendor app itself talks to.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use gridrewards_core::{Device, GridRewards, Home, HomeId, RewardPeriodRequest};

use crate::error::FetchError;
use crate::gateway::RewardsGateway;
use crate::token::{Credentials, Token};

// ============================================================================
// Constants
// ============================================================================

/// Credential exchange endpoint.
const AUTH_URL: &str = "https://app.tibber.com/login.credentials";

/// GraphQL endpoint used by the vendor app.
const GRAPHQL_URL: &str = "https://app.tibber.com/v4/gql";

/// Request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The login response carries no expiry; observed token lifetime is one
/// hour.
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Fallback wait when a 429 carries no Retry-After header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// Home list query.
const HOMES_QUERY: &str = r"
{
  me {
    homes {
      id
      timeZone
      hasSmartMeterCapabilities
      hasSignedEnergyDeal
      hasConsumption
    }
  }
}
";

/// Device ("gizmo") list query for one home.
const DEVICES_QUERY: &str = r"
query GetGizmos($homeId: String!) {
  me {
    home(id: $homeId) {
      gizmos {
        __typename
        ... on Gizmo {
          id
          title
          type
          isHidden
        }
      }
    }
  }
}
";

/// Grid-rewards history for one period. The API only honors monthly
/// resolution.
const GRID_REWARDS_QUERY: &str = r"
query GetGridRewards($homeId: String!, $fromDate: String!, $toDate: String!) {
  me {
    home(id: $homeId) {
      gridRewardsHistoryPeriod(
        from: $fromDate,
        to: $toDate,
        resolution: monthly
      ) {
        from
        to
        batteryRewards
        vehicleRewards
        totalReward
        currency
      }
    }
  }
}
";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RewardsPeriod {
    #[serde(rename = "vehicleRewards")]
    vehicle_rewards: Option<f64>,
    #[serde(rename = "batteryRewards")]
    battery_rewards: Option<f64>,
    #[serde(rename = "totalReward")]
    total_reward: Option<f64>,
    currency: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl From<RewardsPeriod> for GridRewards {
    fn from(period: RewardsPeriod) -> Self {
        GridRewards {
            ev: period.vehicle_rewards,
            battery: period.battery_rewards,
            total: period.total_reward,
            currency: period.currency,
            period_from: period.from,
            period_to: period.to,
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Reqwest-backed implementation of [`RewardsGateway`].
#[derive(Debug, Clone)]
pub struct TibberGateway {
    http: reqwest::Client,
    auth_url: String,
    graphql_url: String,
}

impl TibberGateway {
    /// Creates a gateway against the production endpoints.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoints(AUTH_URL, GRAPHQL_URL)
    }

    /// Creates a gateway against custom endpoints, for integration tests.
    pub fn with_endpoints(
        auth_url: impl Into<String>,
        graphql_url: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("gridrewards/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            auth_url: auth_url.into(),
            graphql_url: graphql_url.into(),
        })
    }

    /// One GraphQL round-trip. Maps the remote service's status-code
    /// vocabulary onto the error taxonomy; does not retry.
    async fn graphql(
        &self,
        token: &Token,
        query: &str,
        variables: Value,
    ) -> Result<Value, FetchError> {
        let payload = json!({ "query": query, "variables": variables });

        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&token.value)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => return Err(FetchError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER))
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                return Err(FetchError::RateLimited { retry_after });
            }
            s if s.is_server_error() => {
                return Err(FetchError::Server { status: s.as_u16() });
            }
            s if !s.is_success() => {
                return Err(FetchError::InvalidResponse(format!(
                    "unexpected status {s}"
                )));
            }
            _ => {}
        }

        let envelope: GraphQlEnvelope = response.json().await.map_err(map_transport_error)?;
        if !envelope.errors.is_empty() {
            let messages: Vec<_> = envelope
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect();
            warn!(errors = ?messages, "GraphQL errors in response");
            return Err(FetchError::InvalidResponse(messages.join(", ")));
        }

        envelope
            .data
            .ok_or_else(|| FetchError::InvalidResponse("missing data field".into()))
    }
}

#[async_trait]
impl RewardsGateway for TibberGateway {
    async fn exchange_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Token, FetchError> {
        debug!(email = %credentials.email, "Exchanging credentials for a token");

        let response = self
            .http
            .post(&self.auth_url)
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::CredentialsInvalid);
        }
        if status.is_server_error() {
            return Err(FetchError::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::InvalidResponse(format!(
                "unexpected login status {status}"
            )));
        }

        let login: LoginResponse = response.json().await.map_err(map_transport_error)?;
        let value = login.token.ok_or_else(|| {
            FetchError::InvalidResponse("login response carried no token".into())
        })?;

        Ok(Token {
            value,
            expires_at: Utc::now() + ChronoDuration::seconds(TOKEN_LIFETIME_SECS),
        })
    }

    async fn homes(&self, token: &Token) -> Result<Vec<Home>, FetchError> {
        let data = self
            .graphql(token, HOMES_QUERY, Value::Null)
            .await?;
        let homes = data
            .pointer("/me/homes")
            .cloned()
            .ok_or_else(|| FetchError::InvalidResponse("homes list missing".into()))?;
        let homes: Vec<Home> = serde_json::from_value(homes)?;

        // Drop structurally broken entries instead of failing the call.
        let valid: Vec<Home> = homes
            .into_iter()
            .filter(|home| !home.id.is_empty())
            .collect();
        debug!(count = valid.len(), "Fetched homes");
        Ok(valid)
    }

    async fn devices(
        &self,
        token: &Token,
        home_id: &HomeId,
    ) -> Result<Vec<Device>, FetchError> {
        debug!(home = %home_id, "Fetching devices");
        let data = self
            .graphql(
                token,
                DEVICES_QUERY,
                json!({ "homeId": home_id.as_str() }),
            )
            .await?;
        let gizmos = data
            .pointer("/me/home/gizmos")
            .cloned()
            .ok_or_else(|| FetchError::InvalidResponse("gizmos list missing".into()))?;
        let devices: Vec<Device> = serde_json::from_value(gizmos)?;
        debug!(count = devices.len(), home = %home_id, "Fetched devices");
        Ok(devices)
    }

    async fn grid_rewards(
        &self,
        token: &Token,
        request: &RewardPeriodRequest,
    ) -> Result<GridRewards, FetchError> {
        debug!(request = %request, "Fetching grid rewards");
        let data = self
            .graphql(
                token,
                GRID_REWARDS_QUERY,
                json!({
                    "homeId": request.home_id.as_str(),
                    "fromDate": request.bounds.from.to_rfc3339(),
                    "toDate": request.bounds.to.to_rfc3339(),
                }),
            )
            .await?;

        match data.pointer("/me/home/gridRewardsHistoryPeriod") {
            // A null period is a valid "nothing happened" answer.
            None | Some(Value::Null) => {
                warn!(request = %request, "Rewards period missing or null");
                Ok(GridRewards::default())
            }
            Some(period) => {
                let period: RewardsPeriod = serde_json::from_value(period.clone())?;
                Ok(period.into())
            }
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(REQUEST_TIMEOUT)
    } else {
        FetchError::Http(err)
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    header
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

// ============================================================================
// Tests
// ============================================================================
