//! Rewards egress - writes per-user reward summaries to file
//!
//! Records are written in JSONL format (one JSON object per line),
//! appending to the file given on the command line.

use crate::domain::types::{UserId, UserReward};
use crate::domain::user::User;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// One user's rewards at the time of export
#[derive(Debug, Serialize)]
pub struct UserRewardsRecord {
    pub user_id: UserId,
    pub user_name: String,
    pub visits: usize,
    pub total_points: i64,
    pub rewards: Vec<UserReward>,
}

impl UserRewardsRecord {
    pub fn from_user(user: &User) -> Self {
        let rewards = user.rewards();
        Self {
            user_id: user.id(),
            user_name: user.user_name().to_string(),
            visits: user.visit_count(),
            total_points: rewards.iter().map(|r| i64::from(r.reward_points)).sum(),
            rewards,
        }
    }
}

/// Egress writer for reward summaries
pub struct RewardsEgress {
    file_path: String,
}

impl RewardsEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write one user's rewards to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_user(&self, user: &User) -> bool {
        let record = UserRewardsRecord::from_user(user);
        let result = serde_json::to_string(&record)
            .map_err(std::io::Error::from)
            .and_then(|json| self.append_line(&json));

        match result {
            Ok(()) => {
                debug!(
                    user_id = %record.user_id,
                    rewards = %record.rewards.len(),
                    total_points = %record.total_points,
                    "user_rewards_egressed"
                );
                true
            }
            Err(e) => {
                error!(user_id = %record.user_id, error = %e, "user_rewards_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Write every user; returns how many were written
    pub fn write_users(&self, users: &[Arc<User>]) -> usize {
        let written = users.iter().filter(|u| self.write_user(u)).count();
        info!(file = %self.file_path, written = %written, total = %users.len(), "rewards_egress_written");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Attraction, Location, VisitedLocation};
    use chrono::Utc;
    use std::fs;
    use tempfile::tempdir;

    fn rewarded_user(name: &str, points: &[i32]) -> Arc<User> {
        let user = User::new(UserId::new(), name, "000", "x@tourGuide.com");
        let visited = VisitedLocation::new(user.id(), Location::new(33.8, -117.9), Utc::now());
        user.add_visited_location(visited.clone());
        for (i, p) in points.iter().enumerate() {
            let attraction = Attraction::new(&format!("Attraction {i}"), "City", "CA", 33.8, -117.9);
            user.add_reward(UserReward::new(visited.clone(), attraction, *p));
        }
        Arc::new(user)
    }

    #[test]
    fn test_write_user() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("rewards.jsonl");
        let egress = RewardsEgress::new(file_path.to_str().unwrap());
        let user = rewarded_user("jon", &[100, 250]);

        assert!(egress.write_user(&user));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["user_name"], "jon");
        assert_eq!(parsed["user_id"], user.id().to_string());
        assert_eq!(parsed["visits"], 1);
        assert_eq!(parsed["total_points"], 350);
        assert_eq!(parsed["rewards"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["rewards"][0]["attraction"]["name"], "Attraction 0");
    }

    #[test]
    fn test_write_users_batch_appends() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("nested").join("rewards.jsonl");
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = RewardsEgress::new(file_path.to_str().unwrap());
        let users: Vec<_> = (0..3).map(|i| rewarded_user(&format!("user{i}"), &[i])).collect();

        assert_eq!(egress.write_users(&users), 3);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("existing"));
        for line in &lines[1..] {
            let _parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("a").join("b").join("rewards.jsonl");
        let egress = RewardsEgress::new(nested_path.to_str().unwrap());

        assert!(egress.write_user(&rewarded_user("jon", &[])));
        assert!(nested_path.exists());
    }
}
