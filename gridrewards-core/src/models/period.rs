//! Reward periods and their UTC bounds.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

// ============================================================================
// Period Bounds
// ============================================================================

/// Half-open UTC time window `[from, to)` for a reward query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodBounds {
    /// Inclusive start of the window.
    pub from: DateTime<Utc>,
    /// Exclusive end of the window.
    pub to: DateTime<Utc>,
}

impl PeriodBounds {
    /// Creates bounds, rejecting inverted windows.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, CoreError> {
        if from >= to {
            return Err(CoreError::InvalidPeriod(format!(
                "from {from} is not before to {to}"
            )));
        }
        Ok(Self { from, to })
    }

    /// True if the window closed more than a day ago, meaning the remote
    /// values can no longer change.
    pub fn is_historical(&self, now: DateTime<Utc>) -> bool {
        self.to < now - chrono::Duration::days(1)
    }
}

impl fmt::Display for PeriodBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Aggregation resolution for reward history queries.
///
/// The remote API only honors monthly resolution; daily requests silently
/// return monthly data. Kept as an enum so the wire format stays explicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Monthly aggregation.
    #[default]
    Monthly,
}

impl Resolution {
    /// Wire name used inside the GraphQL query.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
        }
    }
}

// ============================================================================
// Standard Periods
// ============================================================================

/// The periods the polling scheduler tracks on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardPeriod {
    /// Month-to-date, stand-in for the current day (the API has no daily
    /// resolution).
    CurrentDay,
    /// First of the current month until the first of next month.
    CurrentMonth,
    /// The full previous calendar month.
    PreviousMonth,
    /// January 1st until the first of next month.
    YearToDate,
}

impl StandardPeriod {
    /// All standard periods, in display order.
    pub const ALL: [StandardPeriod; 4] = [
        StandardPeriod::CurrentDay,
        StandardPeriod::CurrentMonth,
        StandardPeriod::PreviousMonth,
        StandardPeriod::YearToDate,
    ];

    /// Returns the display name for this period.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::CurrentDay => "current day",
            Self::CurrentMonth => "current month",
            Self::PreviousMonth => "previous month",
            Self::YearToDate => "year to date",
        }
    }

    /// Computes the UTC bounds of this period as seen from `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> PeriodBounds {
        let month_start = start_of_month(now.year(), now.month());
        let next_month_start = if now.month() == 12 {
            start_of_month(now.year() + 1, 1)
        } else {
            start_of_month(now.year(), now.month() + 1)
        };

        let (from, to) = match self {
            // Month-to-date: the API cannot do daily windows.
            Self::CurrentDay | Self::CurrentMonth => (month_start, next_month_start),
            Self::PreviousMonth => {
                let previous = if now.month() == 1 {
                    start_of_month(now.year() - 1, 12)
                } else {
                    start_of_month(now.year(), now.month() - 1)
                };
                (previous, month_start)
            }
            Self::YearToDate => (start_of_month(now.year(), 1), next_month_start),
        };

        PeriodBounds { from, to }
    }
}

impl fmt::Display for StandardPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

fn start_of_month(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_bounds_rejects_inverted_window() {
        assert!(PeriodBounds::new(at(2025, 3, 2), at(2025, 3, 1)).is_err());
    }

    #[test]
    fn test_current_month_bounds() {
        let bounds = StandardPeriod::CurrentMonth.bounds(at(2025, 3, 14));
        assert_eq!(bounds.from, at(2025, 3, 1) - chrono::Duration::hours(12));
        assert_eq!(bounds.to, at(2025, 4, 1) - chrono::Duration::hours(12));
    }

    #[test]
    fn test_december_rolls_into_next_year() {
        let bounds = StandardPeriod::CurrentMonth.bounds(at(2025, 12, 20));
        assert_eq!(bounds.to.year(), 2026);
        assert_eq!(bounds.to.month(), 1);
    }

    #[test]
    fn test_previous_month_across_january() {
        let bounds = StandardPeriod::PreviousMonth.bounds(at(2025, 1, 5));
        assert_eq!(bounds.from.year(), 2024);
        assert_eq!(bounds.from.month(), 12);
        assert_eq!(bounds.to.year(), 2025);
        assert_eq!(bounds.to.month(), 1);
    }

    #[test]
    fn test_year_to_date_starts_in_january() {
        let bounds = StandardPeriod::YearToDate.bounds(at(2025, 7, 9));
        assert_eq!(bounds.from.month(), 1);
        assert_eq!(bounds.from.day(), 1);
    }

    #[test]
    fn test_historical_detection() {
        let now = at(2025, 6, 15);
        let closed = PeriodBounds::new(at(2025, 4, 1), at(2025, 5, 1)).unwrap();
        let open = StandardPeriod::CurrentMonth.bounds(now);
        assert!(closed.is_historical(now));
        assert!(!open.is_historical(now));
    }
}
