//! Services - business logic and state management
//!
//! This module contains the tracking and rewards pipeline:
//! - `tracker` - Orchestrates location tracking and reward triggering
//! - `reward_engine` - Admission-controlled reward calculation
//! - `reward_cache` - Single-flight memoization of reward points
//! - `location_cache` - TTL cache of each user's last location
//! - `catalog` - Attraction list, fetched once
//! - `pool` - Bounded worker pools
//! - `geometry` - Great-circle distance

pub mod catalog;
pub mod geometry;
pub mod location_cache;
pub mod pool;
pub mod reward_cache;
pub mod reward_engine;
pub mod tracker;

// Re-export commonly used types
pub use catalog::AttractionCatalog;
pub use location_cache::LocationCache;
pub use pool::WorkerPool;
pub use reward_cache::{PointsHandle, RewardCache};
pub use reward_engine::RewardEngine;
pub use tracker::{Providers, TrackReport, Tracker};
