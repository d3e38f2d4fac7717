//! Domain models - core value types and the traveler entity
//!
//! This module contains the canonical data types used throughout the system:
//! - `Attraction` - catalog entry with coordinates
//! - `VisitedLocation` - a user's position at a point in time
//! - `UserReward` - points earned for visiting near an attraction
//! - `User` - traveler with append-only history and name-keyed rewards

pub mod types;
pub mod user;

// Re-export commonly used types at module level
pub use types::{
    Attraction, AttractionId, CachedLocation, Location, UserId, UserReward, VisitedLocation,
};
pub use user::User;
