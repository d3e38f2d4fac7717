//! End-to-end tests of the tracking and rewards pipeline
//!
//! Uses the simulated providers through the public API only. The volume
//! scenarios run at reduced scale with generous time budgets.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tourguide::domain::{User, UserId, VisitedLocation};
use tourguide::infra::{Config, Metrics};
use tourguide::io::{builtin_attractions, generate_users, StaticAttractionProvider};
use tourguide::io::{SimulatedLocationProvider, SimulatedRewardPointsProvider};
use tourguide::services::{Providers, Tracker};

fn simulated_tracker(config: &Config, location_latency_ms: u64, points_latency_ms: u64) -> Tracker {
    let providers = Providers {
        location: Arc::new(SimulatedLocationProvider::new(Duration::from_millis(location_latency_ms))),
        points: Arc::new(SimulatedRewardPointsProvider::new(Duration::from_millis(points_latency_ms))),
        attractions: Arc::new(StaticAttractionProvider::builtin()),
    };
    Tracker::new(config, providers, Arc::new(Metrics::new())).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_high_volume_track_location() {
    let config = Config::default();
    let tracker = simulated_tracker(&config, 20, 1);
    let users = generate_users(1000, 3);

    let report = tracker.track_all(&users).await.into_result().unwrap();

    assert_eq!(report.tracked, 1000);
    // 100 workers at 20ms per lookup is ~200ms of tracking
    assert!(report.elapsed < Duration::from_secs(10), "tracking took {:?}", report.elapsed);
    assert!(users.iter().all(|u| u.visit_count() == 4));
    assert!(tracker.shutdown(Duration::from_secs(60)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_high_volume_get_rewards() {
    let config = Config::default();
    let tracker = simulated_tracker(&config, 0, 5);
    let attraction = builtin_attractions().remove(0);
    let users = generate_users(1000, 0);
    for user in &users {
        user.add_visited_location(VisitedLocation::new(user.id(), attraction.location, Utc::now()));
    }

    let start = Instant::now();
    for user in &users {
        tracker.engine().calculate_rewards(user.clone()).await.unwrap();
    }
    assert!(tracker.engine().await_completion(Duration::from_secs(60)).await);
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(20), "rewards took {elapsed:?}");
    for user in &users {
        let rewards = tracker.user_rewards(user);
        assert!(!rewards.is_empty());
        assert!(rewards.iter().any(|r| r.attraction.name == attraction.name));
    }
    assert_eq!(tracker.engine().available_permits(), config.admission_permits());
    assert_eq!(tracker.metrics().reward_tasks_completed(), 1000);
    assert_eq!(tracker.metrics().rewards_granted(), 1000);
    assert_eq!(tracker.metrics().points_calls(), 1000);
}

#[tokio::test]
async fn test_near_all_attractions() {
    let config = Config::default();
    let tracker = simulated_tracker(&config, 0, 0);
    let user = generate_users(1, 1).remove(0);

    tracker.engine().set_proximity_buffer(f64::from(i32::MAX));
    tracker.engine().calculate_rewards(user.clone()).await.unwrap();
    assert!(tracker.engine().await_completion(Duration::from_secs(10)).await);

    let rewards = tracker.user_rewards(&user);
    assert_eq!(rewards.len(), builtin_attractions().len());
    assert!(rewards.iter().all(|r| (1..=1000).contains(&r.reward_points)));
    assert_eq!(user.total_reward_points(), rewards.iter().map(|r| i64::from(r.reward_points)).sum::<i64>());
}

#[tokio::test]
async fn test_track_then_nearby_attractions() {
    let config = Config::default();
    let tracker = simulated_tracker(&config, 0, 0);
    let user = Arc::new(User::new(UserId::new(), "internalUser0", "000", "internalUser0@tourGuide.com"));

    let visited = tracker.user_location(&user).await.unwrap();
    assert_eq!(visited.user_id, user.id());
    assert_eq!(user.visit_count(), 1);

    let nearby = tracker.nearby_attractions(&visited.location).await.unwrap();
    assert_eq!(nearby.len(), config.nearby_attractions_limit());

    // Location already known, so no second track
    assert_eq!(tracker.user_location(&user).await.unwrap(), visited);
    assert_eq!(user.visit_count(), 1);
    assert!(tracker.shutdown(Duration::from_secs(10)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_calculations_never_duplicate_rewards() {
    let config = Config::default().with_pools(20, 20, 8);
    let tracker = simulated_tracker(&config, 0, 10);
    let users = generate_users(50, 3);
    tracker.engine().set_proximity_buffer(f64::from(i32::MAX));

    for _ in 0..3 {
        for user in &users {
            tracker.engine().calculate_rewards(user.clone()).await.unwrap();
        }
    }
    assert!(tracker.engine().await_completion(Duration::from_secs(60)).await);

    let catalog_size = builtin_attractions().len();
    for user in &users {
        let rewards = user.rewards();
        assert_eq!(rewards.len(), catalog_size);
        let mut names: Vec<_> = rewards.iter().map(|r| r.attraction.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), catalog_size);
    }
}
