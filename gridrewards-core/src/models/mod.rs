//! Domain models for gridrewards.

pub mod home;
pub mod period;
pub mod reward;

pub use home::{Device, DeviceCategory, DeviceFilter, Home, HomeId};
pub use period::{PeriodBounds, Resolution, StandardPeriod};
pub use reward::{GridRewards, RewardPeriodRequest};
