// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # gridrewards Core
//!
//! Core types and models shared across the gridrewards crates.
//!
//! This crate defines the domain vocabulary of the system:
//!
//! - [`HomeId`], [`Home`], [`Device`], [`DeviceCategory`] - the account's
//!   homes and reward-bearing devices
//! - [`PeriodBounds`], [`StandardPeriod`], [`Resolution`] - the time windows
//!   reward queries run over
//! - [`RewardPeriodRequest`], [`GridRewards`] - the unit of work passed into
//!   the fetch layer and the monetary values it yields
//! - [`CoreError`] - validation and data errors
//!
//! Everything network-facing lives in `gridrewards-fetch`; everything
//! persistent lives in `gridrewards-store`.

pub mod error;
pub mod models;

pub use error::CoreError;
pub use models::{
    Device, DeviceCategory, DeviceFilter, GridRewards, Home, HomeId, PeriodBounds,
    Resolution, RewardPeriodRequest, StandardPeriod,
};
