//! Shared value types for the tracking and rewards pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Newtype wrapper for user IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a fresh, time-ordered user ID
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for attraction IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AttractionId(pub Uuid);

impl AttractionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AttractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttractionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geographic coordinates in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A point of interest from the attraction catalog
///
/// Immutable once fetched. Rewards are keyed by `name`, not `id`, so two
/// attractions sharing a display name count as the same reward target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attraction {
    pub id: AttractionId,
    pub name: String,
    pub city: String,
    pub state: String,
    pub location: Location,
}

impl Attraction {
    pub fn new(name: &str, city: &str, state: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            id: AttractionId::new(),
            name: name.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            location: Location::new(latitude, longitude),
        }
    }
}

/// A user's position at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedLocation {
    pub user_id: UserId,
    pub location: Location,
    pub time_visited: DateTime<Utc>,
}

impl VisitedLocation {
    #[inline]
    pub fn new(user_id: UserId, location: Location, time_visited: DateTime<Utc>) -> Self {
        Self { user_id, location, time_visited }
    }
}

/// Location cache entry: the fetched location plus when it was cached
#[derive(Debug, Clone)]
pub struct CachedLocation {
    pub visited: VisitedLocation,
    pub cached_at: Instant,
}

impl CachedLocation {
    pub fn new(visited: VisitedLocation) -> Self {
        Self { visited, cached_at: Instant::now() }
    }

    /// True once the entry's age has reached `ttl`
    #[inline]
    pub fn is_expired(&self, ttl: std::time::Duration) -> bool {
        self.cached_at.elapsed() >= ttl
    }
}

/// Points awarded to a user for being near an attraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReward {
    pub visited_location: VisitedLocation,
    pub attraction: Attraction,
    pub reward_points: i32,
}

impl UserReward {
    pub fn new(visited_location: VisitedLocation, attraction: Attraction, reward_points: i32) -> Self {
        Self { visited_location, attraction, reward_points }
    }
}
