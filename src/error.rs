//! Error types for provider calls, reward admission and tracking

use crate::domain::types::UserId;
use std::time::Duration;

/// Failure reported by an external provider (location, points, catalog)
///
/// Cloneable so one failed single-flight computation can be handed to every
/// waiter attached to it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool task failed: {0}")]
    TaskFailed(String),
}

/// Errors visible to callers of `RewardEngine::calculate_rewards`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewardError {
    #[error("Reward engine is shutting down")]
    ShuttingDown,

    #[error("No admission permit within {0:?}")]
    AdmissionTimeout(Duration),
}

/// Errors visible to callers of the tracker
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    #[error("Location lookup failed for user {user_id}: {source}")]
    Location {
        user_id: UserId,
        #[source]
        source: ProviderError,
    },

    #[error("Tracking task for user {user_id} failed: {source}")]
    TaskFailed {
        user_id: UserId,
        #[source]
        source: PoolError,
    },

    #[error("Tracking failed for {failed} of {total} users")]
    Aggregate { failed: usize, total: usize },
}

impl TrackError {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            TrackError::Location { user_id, .. } | TrackError::TaskFailed { user_id, .. } => {
                Some(*user_id)
            }
            TrackError::Aggregate { .. } => None,
        }
    }
}
