//! Core error types for gridrewards.

use thiserror::Error;

/// Core error type for gridrewards operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Home identifier is not a valid UUID.
    #[error("Invalid home id: {0}")]
    InvalidHomeId(String),

    /// Period bounds are inverted or otherwise unusable.
    #[error("Invalid period bounds: {0}")]
    InvalidPeriod(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data from an API response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
