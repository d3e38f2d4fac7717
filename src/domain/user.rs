//! Traveler state shared between the tracker and the reward engine
//!
//! A `User` is handed around as `Arc<User>`. History is append-only and
//! readers always get an owned snapshot, so a reward task iterating over
//! visited locations never sees a concurrent append mid-iteration.

use crate::domain::types::{UserId, UserReward, VisitedLocation};
use parking_lot::{Mutex, RwLock};

#[derive(Debug)]
pub struct User {
    id: UserId,
    user_name: String,
    phone_number: String,
    email_address: String,
    /// Arrival order, not capture-time order
    visited_locations: RwLock<Vec<VisitedLocation>>,
    /// At most one entry per attraction name
    rewards: Mutex<Vec<UserReward>>,
}

impl User {
    pub fn new(id: UserId, user_name: &str, phone_number: &str, email_address: &str) -> Self {
        Self {
            id,
            user_name: user_name.to_string(),
            phone_number: phone_number.to_string(),
            email_address: email_address.to_string(),
            visited_locations: RwLock::new(Vec::new()),
            rewards: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn email_address(&self) -> &str {
        &self.email_address
    }

    pub fn add_visited_location(&self, visited: VisitedLocation) {
        self.visited_locations.write().push(visited);
    }

    /// Owned copy of the history at the time of the call
    pub fn visited_locations(&self) -> Vec<VisitedLocation> {
        self.visited_locations.read().clone()
    }

    pub fn last_visited_location(&self) -> Option<VisitedLocation> {
        self.visited_locations.read().last().cloned()
    }

    pub fn visit_count(&self) -> usize {
        self.visited_locations.read().len()
    }

    pub fn has_reward_for(&self, attraction_name: &str) -> bool {
        self.rewards.lock().iter().any(|r| r.attraction.name == attraction_name)
    }

    /// Append a reward unless one already exists for the same attraction name
    ///
    /// The check and the push happen under one lock, so two tasks racing on
    /// the same attraction cannot both append. Returns whether it was added.
    pub fn add_reward(&self, reward: UserReward) -> bool {
        let mut rewards = self.rewards.lock();
        if rewards.iter().any(|r| r.attraction.name == reward.attraction.name) {
            return false;
        }
        rewards.push(reward);
        true
    }

    pub fn rewards(&self) -> Vec<UserReward> {
        self.rewards.lock().clone()
    }

    pub fn reward_count(&self) -> usize {
        self.rewards.lock().len()
    }

    pub fn total_reward_points(&self) -> i64 {
        self.rewards.lock().iter().map(|r| i64::from(r.reward_points)).sum()
    }
}
