//! Configuration management.
//!
//! Knobs live in a JSON file; credentials never do. Email and password
//! come from the environment so the config file stays safe to share.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use gridrewards_fetch::{Credentials, LimiterConfig, RetryPolicy};

use crate::error::StoreError;
use crate::persistence::{self, default_config_path};

/// Environment variable holding the account email.
pub const ENV_EMAIL: &str = "TIBBER_EMAIL";
/// Environment variable holding the account password.
pub const ENV_PASSWORD: &str = "TIBBER_PASSWORD";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Home to poll, as a UUID. `None` means discover via the homes query.
    #[serde(default)]
    pub home_id: Option<String>,
    /// Polling settings.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Rate-limiter settings.
    #[serde(default)]
    pub limiter: LimiterSettings,
    /// Retry settings.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Log level filter, e.g. "info" or "gridrewards_fetch=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How often the watch loop polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between reward-period refreshes.
    #[serde(default = "default_rewards_interval")]
    pub rewards_interval_secs: u64,
    /// Seconds between device-inventory refreshes.
    #[serde(default = "default_devices_interval")]
    pub devices_interval_secs: u64,
}

/// Rolling-window request quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Requests allowed per hour.
    #[serde(default = "default_hourly_capacity")]
    pub hourly_capacity: u32,
    /// Requests allowed per burst window.
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,
    /// Burst window length in seconds.
    #[serde(default = "default_burst_window")]
    pub burst_window_secs: u64,
}

/// Backoff behavior for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    /// Backoff ceiling in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

fn default_rewards_interval() -> u64 {
    900
}

fn default_devices_interval() -> u64 {
    12 * 60 * 60
}

fn default_hourly_capacity() -> u32 {
    80
}

fn default_burst_capacity() -> u32 {
    20
}

fn default_burst_window() -> u64 {
    900
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            rewards_interval_secs: default_rewards_interval(),
            devices_interval_secs: default_devices_interval(),
        }
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            hourly_capacity: default_hourly_capacity(),
            burst_capacity: default_burst_capacity(),
            burst_window_secs: default_burst_window(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home_id: None,
            polling: PollingConfig::default(),
            limiter: LimiterSettings::default(),
            retry: RetrySettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub async fn load() -> Result<Self, StoreError> {
        Self::load_from(&default_config_path()).await
    }

    /// Loads configuration from a specific path.
    pub async fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let config: Config = persistence::load_json(path).await?;
        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub async fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        persistence::save_json(path, self).await?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Rejects settings the fetch stack cannot run with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.limiter.hourly_capacity == 0 || self.limiter.burst_capacity == 0 {
            return Err(StoreError::Config(
                "limiter capacities must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(StoreError::Config(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        if self.polling.rewards_interval_secs == 0 {
            return Err(StoreError::Config(
                "polling.rewards_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The limiter configuration these settings describe.
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            hourly_capacity: self.limiter.hourly_capacity,
            burst_capacity: self.limiter.burst_capacity,
            burst_window: Duration::from_secs(self.limiter.burst_window_secs),
            ..LimiterConfig::default()
        }
    }

    /// The retry policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.retry.max_attempts)
            .with_base_delay(Duration::from_secs(self.retry.base_delay_secs))
            .with_max_delay(Duration::from_secs(self.retry.max_delay_secs))
    }

    /// Interval between reward refreshes in the watch loop.
    pub fn rewards_interval(&self) -> Duration {
        Duration::from_secs(self.polling.rewards_interval_secs)
    }

    /// Interval between device-inventory refreshes in the watch loop.
    pub fn devices_interval(&self) -> Duration {
        Duration::from_secs(self.polling.devices_interval_secs)
    }
}

/// Reads account credentials from the environment.
///
/// Values are validated but never logged; the fetch crate redacts them
/// in Debug output as well.
pub fn credentials_from_env() -> Result<Credentials, StoreError> {
    let email = std::env::var(ENV_EMAIL)
        .map_err(|_| StoreError::MissingCredentials(format!("{ENV_EMAIL} is not set")))?;
    let password = std::env::var(ENV_PASSWORD)
        .map_err(|_| StoreError::MissingCredentials(format!("{ENV_PASSWORD} is not set")))?;

    Credentials::new(email, password)
        .map_err(|e| StoreError::MissingCredentials(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limiter.hourly_capacity, 80);
        assert_eq!(config.polling.rewards_interval_secs, 900);
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut config = Config::default();
        config.limiter.burst_capacity = 0;
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"home_id": "abc", "limiter": {"burst_capacity": 5}}"#)
                .unwrap();
        assert_eq!(config.home_id.as_deref(), Some("abc"));
        assert_eq!(config.limiter.burst_capacity, 5);
        assert_eq!(config.limiter.hourly_capacity, 80);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.home_id = Some("96a14971-525a-4420-aae9-e5aedaa129ff".to_string());
        config.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert_eq!(loaded.home_id, config.home_id);
    }
}
