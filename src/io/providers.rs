//! External collaborators consumed by the pipeline
//!
//! Location, reward points and the attraction catalog all live behind
//! async traits so the core never depends on a concrete backend.

use crate::domain::types::{Attraction, AttractionId, UserId, VisitedLocation};
use crate::error::ProviderError;
use async_trait::async_trait;

/// Source of a user's current position
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self, user_id: UserId) -> Result<VisitedLocation, ProviderError>;
}

/// Source of reward points for an (attraction, user) pair
///
/// Calls are slow and must be made at most once per pair.
#[async_trait]
pub trait RewardPointsProvider: Send + Sync {
    async fn attraction_reward_points(
        &self,
        attraction_id: AttractionId,
        user_id: UserId,
    ) -> Result<i32, ProviderError>;
}

/// Source of the attraction catalog, fetched once per process
#[async_trait]
pub trait AttractionProvider: Send + Sync {
    async fn attractions(&self) -> Result<Vec<Attraction>, ProviderError>;
}
