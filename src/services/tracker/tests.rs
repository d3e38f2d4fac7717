//! Tests for the Tracker module

use super::*;
use crate::domain::types::{AttractionId, UserId};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reports every user at a fixed spot, except users marked as failing
struct FixedLocationProvider {
    location: Location,
    latency: Duration,
    calls: AtomicUsize,
    failing: Mutex<FxHashSet<UserId>>,
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_location(&self, user_id: UserId) -> Result<VisitedLocation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.lock().contains(&user_id) {
            return Err(ProviderError::Unavailable("gps offline".to_string()));
        }
        Ok(VisitedLocation::new(user_id, self.location, Utc::now()))
    }
}

struct FixedPoints;

#[async_trait]
impl RewardPointsProvider for FixedPoints {
    async fn attraction_reward_points(
        &self,
        _attraction_id: AttractionId,
        _user_id: UserId,
    ) -> Result<i32, ProviderError> {
        Ok(100)
    }
}

struct ListAttractions(Vec<Attraction>);

#[async_trait]
impl AttractionProvider for ListAttractions {
    async fn attractions(&self) -> Result<Vec<Attraction>, ProviderError> {
        Ok(self.0.clone())
    }
}

/// Test harness that keeps the location stub reachable for assertions
struct TestTracker {
    tracker: Tracker,
    gps: Arc<FixedLocationProvider>,
}

impl std::ops::Deref for TestTracker {
    type Target = Tracker;
    fn deref(&self) -> &Self::Target {
        &self.tracker
    }
}

fn disneyland() -> Attraction {
    Attraction::new("Disneyland", "Anaheim", "CA", 33.817595, -117.922008)
}

fn test_config() -> Config {
    Config::default().with_pools(16, 16, 4)
}

fn create_test_tracker() -> TestTracker {
    create_test_tracker_with(test_config(), vec![disneyland()], millis(0))
}

fn create_test_tracker_with(config: Config, attractions: Vec<Attraction>, latency: Duration) -> TestTracker {
    let gps = Arc::new(FixedLocationProvider {
        // A couple of miles from Disneyland
        location: Location::new(33.83, -117.93),
        latency,
        calls: AtomicUsize::new(0),
        failing: Mutex::new(FxHashSet::default()),
    });
    let providers = Providers {
        location: gps.clone(),
        points: Arc::new(FixedPoints),
        attractions: Arc::new(ListAttractions(attractions)),
    };
    let tracker = Tracker::new(&config, providers, Arc::new(Metrics::new())).unwrap();
    TestTracker { tracker, gps }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn new_user(name: &str) -> Arc<User> {
    Arc::new(User::new(UserId::new(), name, "000", &format!("{name}@tourGuide.com")))
}

#[tokio::test]
async fn test_track_one_records_location_and_rewards() {
    let tracker = create_test_tracker();
    let user = new_user("jon");

    let visited = tracker.track_one(&user).await.unwrap();
    assert_eq!(visited.user_id, user.id());
    assert_eq!(user.last_visited_location(), Some(visited));

    assert!(tracker.engine().await_completion(millis(5000)).await);
    let rewards = tracker.user_rewards(&user);
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].attraction.name, "Disneyland");
    assert_eq!(rewards[0].reward_points, 100);
}

#[tokio::test]
async fn test_track_one_location_failure() {
    let tracker = create_test_tracker();
    let user = new_user("jon");
    tracker.gps.failing.lock().insert(user.id());

    let err = tracker.track_one(&user).await.unwrap_err();
    assert_eq!(err.user_id(), Some(user.id()));
    assert!(matches!(err, TrackError::Location { source: ProviderError::Unavailable(_), .. }));
    assert_eq!(user.visit_count(), 0);
    assert_eq!(tracker.engine().outstanding(), 0);
}

#[tokio::test]
async fn test_track_one_uses_cached_location_within_ttl() {
    let tracker = create_test_tracker();
    let user = new_user("jon");

    let first = tracker.track_one(&user).await.unwrap();
    let second = tracker.track_one(&user).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(tracker.gps.calls.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.metrics().location_cache_hits(), 1);
    assert_eq!(user.visit_count(), 2);
}

#[tokio::test]
async fn test_track_one_after_engine_shutdown_still_tracks() {
    let tracker = create_test_tracker();
    let user = new_user("jon");
    tracker.engine().shutdown();

    let visited = tracker.track_one(&user).await.unwrap();
    assert_eq!(user.last_visited_location(), Some(visited));
    assert_eq!(user.reward_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_track_all_aggregates_failures() {
    let tracker = create_test_tracker();
    let users: Vec<_> = (0..20).map(|i| new_user(&format!("user{i}"))).collect();
    for user in users.iter().step_by(5) {
        tracker.gps.failing.lock().insert(user.id());
    }

    let report = tracker.track_all(&users).await;
    assert_eq!(report.total, 20);
    assert_eq!(report.tracked, 16);
    assert_eq!(report.failures.len(), 4);
    assert!(!report.is_complete());

    // Failed users left untouched, everyone else tracked
    for (i, user) in users.iter().enumerate() {
        assert_eq!(user.visit_count(), usize::from(i % 5 != 0));
    }

    match report.into_result() {
        Err(TrackError::Aggregate { failed, total }) => {
            assert_eq!(failed, 4);
            assert_eq!(total, 20);
        }
        other => panic!("expected aggregate error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_track_all_runs_users_concurrently() {
    let config = Config::default().with_pools(50, 16, 4);
    let tracker = create_test_tracker_with(config, vec![disneyland()], millis(100));
    let users: Vec<_> = (0..50).map(|i| new_user(&format!("user{i}"))).collect();

    let report = tracker.track_all(&users).await.into_result().unwrap();

    assert_eq!(report.tracked, 50);
    // Serially this would take 5 seconds
    assert!(report.elapsed < Duration::from_secs(2), "took {:?}", report.elapsed);
    assert!(tracker.shutdown(Duration::from_secs(10)).await);
    assert!(users.iter().all(|u| u.reward_count() == 1));
}

#[tokio::test]
async fn test_track_all_empty() {
    let tracker = create_test_tracker();
    let report = tracker.track_all(&[]).await;
    assert_eq!(report.total, 0);
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn test_nearby_attractions_closest_first() {
    let attractions = crate::io::simulated::builtin_attractions();
    let tracker = create_test_tracker_with(test_config(), attractions, millis(0));
    let near_anaheim = Location::new(33.83, -117.93);

    let nearby = tracker.nearby_attractions(&near_anaheim).await.unwrap();
    assert_eq!(nearby.len(), 5);
    assert_eq!(nearby[0].name, "Disneyland");

    let distances: Vec<f64> = nearby.iter().map(|a| distance(&a.location, &near_anaheim)).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_nearby_attractions_fewer_than_limit_and_ties() {
    let spot = Location::new(10.0, 10.0);
    let attractions = vec![
        Attraction::new("Far", "A", "AA", 12.0, 10.0),
        Attraction::new("Twin North", "B", "BB", 11.0, 10.0),
        Attraction::new("Twin South", "B", "BB", 11.0, 10.0),
        Attraction::new("Here", "C", "CC", 10.0, 10.0),
    ];
    let tracker = create_test_tracker_with(test_config(), attractions, millis(0));

    let nearby = tracker.nearby_attractions(&spot).await.unwrap();
    let names: Vec<_> = nearby.iter().map(|a| a.name.as_str()).collect();
    // The twins share a position and keep catalog order
    assert_eq!(names, vec!["Here", "Twin North", "Twin South", "Far"]);
}

#[tokio::test]
async fn test_user_location_prefers_history() {
    let tracker = create_test_tracker();
    let user = new_user("jon");
    let known = VisitedLocation::new(user.id(), Location::new(1.0, 2.0), Utc::now());
    user.add_visited_location(known.clone());

    assert_eq!(tracker.user_location(&user).await.unwrap(), known);
    assert_eq!(tracker.gps.calls.load(Ordering::SeqCst), 0);

    let fresh = new_user("ann");
    let visited = tracker.user_location(&fresh).await.unwrap();
    assert_eq!(visited.location, Location::new(33.83, -117.93));
    assert_eq!(tracker.gps.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_signal() {
    let tracker = create_test_tracker();
    let users = vec![new_user("jon"), new_user("ann")];
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = {
        let tracker = tracker.tracker.clone();
        let users = users.clone();
        tokio::spawn(async move { tracker.run(users, millis(20), shutdown_rx).await })
    };

    tokio::time::sleep(millis(100)).await;
    shutdown_tx.send(true).unwrap();

    let rounds = tokio::time::timeout(millis(1000), handle).await.unwrap().unwrap();
    assert!(rounds >= 2, "only {rounds} rounds");
    assert!(users.iter().all(|u| u.visit_count() == rounds));
}

#[tokio::test]
async fn test_shutdown_drains_and_rejects() {
    let tracker = create_test_tracker();
    let user = new_user("jon");
    tracker.track_one(&user).await.unwrap();

    assert!(tracker.shutdown(millis(5000)).await);
    assert!(tracker.engine().is_shut_down());
    assert_eq!(user.reward_count(), 1);
    assert_eq!(tracker.tracking_pool().in_flight(), 0);
}

#[tokio::test]
async fn test_new_refuses_permits_at_reward_worker_count() {
    let providers = Providers {
        location: Arc::new(FixedLocationProvider {
            location: disneyland().location,
            latency: millis(0),
            calls: AtomicUsize::new(0),
            failing: Mutex::new(FxHashSet::default()),
        }),
        points: Arc::new(FixedPoints),
        attractions: Arc::new(ListAttractions(vec![disneyland()])),
    };
    let config = Config::default().with_pools(4, 2, 2);

    let err = Tracker::new(&config, providers, Arc::new(Metrics::new())).err().unwrap();
    assert!(format!("{err:#}").contains("must be below rewards.workers"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tightest_valid_sizing_drains() {
    // One reward worker spare beyond the admission permits
    let config = Config::default().with_pools(4, 3, 2);
    let tracker = create_test_tracker_with(config, vec![disneyland()], millis(0));
    let users: Vec<_> = (0..10).map(|i| new_user(&format!("user{i}"))).collect();

    let report = tokio::time::timeout(millis(5000), tracker.track_all(&users)).await.unwrap();
    assert_eq!(report.tracked, 10);
    assert!(tracker.engine().await_completion(millis(5000)).await);
    assert!(users.iter().all(|u| u.reward_count() == 1));
}
