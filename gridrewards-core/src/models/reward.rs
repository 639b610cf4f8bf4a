//! Grid-reward values and the requests that produce them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::home::{DeviceFilter, HomeId};
use super::period::{PeriodBounds, Resolution, StandardPeriod};

// ============================================================================
// Reward Period Request
// ============================================================================

/// One logical "fetch this period's rewards" unit of work.
///
/// Two requests with identical fields are the same logical request and map
/// to the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewardPeriodRequest {
    /// Home to query.
    pub home_id: HomeId,
    /// Device-category filter.
    pub filter: DeviceFilter,
    /// UTC window being asked about.
    pub bounds: PeriodBounds,
    /// Aggregation resolution.
    pub resolution: Resolution,
    /// The standard period this request was derived from, if any. Carried
    /// for labeling and TTL selection, not part of the wire request.
    pub label: Option<StandardPeriod>,
}

impl RewardPeriodRequest {
    /// Builds a request for a standard period as seen from `now`.
    pub fn standard(
        home_id: HomeId,
        period: StandardPeriod,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            home_id,
            filter: DeviceFilter::All,
            bounds: period.bounds(now),
            resolution: Resolution::Monthly,
            label: Some(period),
        }
    }

    /// Builds the full standard-period fan-out set for one home.
    pub fn standard_set(
        home_id: &HomeId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Vec<Self> {
        StandardPeriod::ALL
            .iter()
            .map(|period| Self::standard(home_id.clone(), *period, now))
            .collect()
    }
}

impl fmt::Display for RewardPeriodRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label {
            Some(period) => write!(f, "{} {}", self.home_id, period),
            None => write!(f, "{} {}", self.home_id, self.bounds),
        }
    }
}

// ============================================================================
// Grid Rewards
// ============================================================================

/// Reward amounts for one period, as reported by the remote service.
///
/// All monetary fields are optional: the service returns nulls for periods
/// without activity, and a null period is a valid answer, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridRewards {
    /// Electric-vehicle smart-charging rewards.
    pub ev: Option<f64>,
    /// Home-battery ("homevolt") rewards.
    pub battery: Option<f64>,
    /// Total reward for the period.
    pub total: Option<f64>,
    /// ISO currency code, e.g. "SEK".
    pub currency: Option<String>,
    /// Period start as echoed by the API.
    pub period_from: Option<String>,
    /// Period end as echoed by the API.
    pub period_to: Option<String>,
}

impl GridRewards {
    /// True if the service reported no values at all for the period.
    pub fn is_empty(&self) -> bool {
        self.ev.is_none() && self.battery.is_none() && self.total.is_none()
    }
}

// ============================================================================
// Tests
// ============================================================================
