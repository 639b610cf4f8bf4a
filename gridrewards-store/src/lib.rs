// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # GridRewards Store
//!
//! Configuration and on-disk state for the gridrewards tools.
//!
//! This crate provides:
//!
//! - **Config**: JSON settings with serde-level defaults and validation
//! - **FileStateStore**: durable rate-limiter counters for the fetch stack
//! - **Persistence**: atomic JSON file I/O with restrictive permissions
//!
//! Credentials are deliberately not part of [`Config`]; they come from the
//! environment via [`credentials_from_env`] so the config file never holds
//! a secret.

pub mod config;
pub mod error;
pub mod limiter_state;
pub mod persistence;

pub use config::{
    credentials_from_env, Config, LimiterSettings, PollingConfig, RetrySettings, ENV_EMAIL,
    ENV_PASSWORD,
};
pub use error::StoreError;
pub use limiter_state::FileStateStore;
pub use persistence::{
    default_config_dir, default_config_path, default_limiter_state_path, default_state_dir,
    load_json, load_json_or_default, save_json,
};
