//! Homes and the devices ("gizmos") attached to them.
//!
//! These mirror the subset of the remote GraphQL schema the client actually
//! queries. Anything the queries do not select simply does not exist here.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::CoreError;

/// UUID shape the remote service uses for home and device ids.
fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
        )
        .expect("valid UUID regex")
    })
}

// ============================================================================
// Home Id
// ============================================================================

/// A validated home identifier.
///
/// The remote service addresses everything by home UUID. Validating once at
/// the edge means the rest of the stack never re-checks the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HomeId(String);

impl HomeId {
    /// Parses and validates a home id.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if uuid_pattern().is_match(&id) {
            Ok(Self(id))
        } else {
            Err(CoreError::InvalidHomeId(Self::redact(&id)))
        }
    }

    /// Returns the full id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a truncated form safe for logs.
    pub fn redacted(&self) -> &str {
        &self.0[..8]
    }

    fn redact(id: &str) -> String {
        // Truncate by characters, not bytes: the rejected input is arbitrary
        // text and a byte slice could land inside a multi-byte char.
        let head: String = id.chars().take(8).collect();
        format!("{head}…")
    }
}

impl fmt::Display for HomeId {
    /// Displays the redacted form. Full ids only travel in requests.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

// ============================================================================
// Home
// ============================================================================

/// A home on the account, as reported by the home-list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Home {
    /// Home UUID.
    pub id: String,
    /// IANA time zone of the home.
    #[serde(default)]
    pub time_zone: Option<String>,
    /// Whether the home has a smart meter.
    #[serde(default)]
    pub has_smart_meter_capabilities: bool,
    /// Whether the home has a signed energy deal.
    #[serde(default)]
    pub has_signed_energy_deal: bool,
    /// Whether consumption data is available.
    #[serde(default)]
    pub has_consumption: bool,
}

// ============================================================================
// Devices
// ============================================================================

/// Device categories relevant to grid rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceCategory {
    /// Real-time power meter.
    RealTimeMeter,
    /// Solar inverter.
    Inverter,
    /// Home battery ("homevolt").
    Battery,
    /// Electric vehicle.
    ElectricVehicle,
    /// EV charger.
    EvCharger,
}

impl DeviceCategory {
    /// Categories the reward pipeline cares about.
    pub const TRACKED: [DeviceCategory; 5] = [
        DeviceCategory::RealTimeMeter,
        DeviceCategory::Inverter,
        DeviceCategory::Battery,
        DeviceCategory::ElectricVehicle,
        DeviceCategory::EvCharger,
    ];

    /// Returns the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::RealTimeMeter => "Real-time meter",
            Self::Inverter => "Inverter",
            Self::Battery => "Battery",
            Self::ElectricVehicle => "Electric vehicle",
            Self::EvCharger => "EV charger",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Filter over device categories used by reward-period requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFilter {
    /// All reward-bearing devices.
    All,
    /// A single category.
    Only(DeviceCategory),
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Only(category) => write!(f, "{category}"),
        }
    }
}

/// A device ("gizmo") attached to a home.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Device UUID.
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable title.
    #[serde(default)]
    pub title: Option<String>,
    /// Device category. `None` for categories the client does not track.
    #[serde(rename = "type", default, deserialize_with = "lenient_category")]
    pub category: Option<DeviceCategory>,
    /// Whether the device is hidden in the vendor app.
    #[serde(default)]
    pub is_hidden: bool,
}

impl Device {
    /// Returns true if the device belongs to a tracked category and has an id.
    pub fn is_tracked(&self) -> bool {
        self.id.is_some() && self.category.is_some()
    }
}

/// The remote service grows new gizmo types without notice. Anything we do
/// not recognize becomes `None` instead of failing the whole response.
fn lenient_category<'de, D>(deserializer: D) -> Result<Option<DeviceCategory>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        serde_json::from_value(serde_json::Value::String(value)).ok()
    }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_id_accepts_uuid() {
        let id = HomeId::new("96a14971-525a-4420-aae9-e5aedaa129ff").unwrap();
        assert_eq!(id.redacted(), "96a14971");
    }

    #[test]
    fn test_home_id_rejects_garbage() {
        assert!(HomeId::new("not-a-uuid").is_err());
        assert!(HomeId::new("").is_err());
    }

    #[test]
    fn test_home_id_rejects_non_ascii() {
        // Multi-byte input must come back as a clean error, and the
        // redacted form in the error must truncate on char boundaries.
        let err = HomeId::new("€€€").unwrap_err();
        assert!(matches!(err, CoreError::InvalidHomeId(ref s) if s.starts_with("€€€")));
        assert!(HomeId::new("ликвидация-не-uuid").is_err());
    }

    #[test]
    fn test_home_id_display_is_redacted() {
        let id = HomeId::new("96a14971-525a-4420-aae9-e5aedaa129ff").unwrap();
        assert_eq!(format!("{id}"), "96a14971");
    }

    #[test]
    fn test_device_category_from_api() {
        let device: Device = serde_json::from_str(
            r#"{"id":"96a14971-525a-4420-aae9-e5aedaa129ff","title":"Garage charger","type":"EV_CHARGER"}"#,
        )
        .unwrap();
        assert_eq!(device.category, Some(DeviceCategory::EvCharger));
        assert!(device.is_tracked());
    }

    #[test]
    fn test_unknown_device_type_is_untracked() {
        let device: Device =
            serde_json::from_str(r#"{"id":"abc","title":"Mystery"}"#).unwrap();
        assert!(!device.is_tracked());
    }
}
