//! IO modules - external system interfaces
//!
//! This module contains the boundaries to external services:
//! - `providers` - traits for the location, points and catalog providers
//! - `simulated` - in-process providers with injected latency, plus synthetic users
//! - `egress` - JSONL export of per-user rewards

pub mod egress;
pub mod providers;
pub mod simulated;

// Re-export commonly used types
pub use egress::{RewardsEgress, UserRewardsRecord};
pub use providers::{AttractionProvider, LocationProvider, RewardPointsProvider};
pub use simulated::{
    builtin_attractions, generate_users, SimulatedLocationProvider, SimulatedRewardPointsProvider,
    StaticAttractionProvider,
};
