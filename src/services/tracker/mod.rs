//! User tracking and reward orchestration
//!
//! The Tracker ties the pipeline together:
//! - Location refresh through the TTL cache, fanned out on the tracking pool
//! - Reward calculation handed to the engine after every tracked location
//! - Nearby attraction lookups against the cached catalog

#[cfg(test)]
mod tests;

use crate::domain::types::{Attraction, Location, UserReward, VisitedLocation};
use crate::domain::user::User;
use crate::error::{PoolError, ProviderError, TrackError};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::providers::{AttractionProvider, LocationProvider, RewardPointsProvider};
use crate::io::simulated::{SimulatedLocationProvider, SimulatedRewardPointsProvider, StaticAttractionProvider};
use crate::services::catalog::AttractionCatalog;
use crate::services::geometry::distance;
use crate::services::location_cache::LocationCache;
use crate::services::pool::WorkerPool;
use crate::services::reward_cache::RewardCache;
use crate::services::reward_engine::RewardEngine;
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// External services the pipeline talks to
#[derive(Clone)]
pub struct Providers {
    pub location: Arc<dyn LocationProvider>,
    pub points: Arc<dyn RewardPointsProvider>,
    pub attractions: Arc<dyn AttractionProvider>,
}

impl Providers {
    /// In-process simulated providers with latencies from `[simulation]`
    pub fn simulated(config: &Config) -> Self {
        Self {
            location: Arc::new(SimulatedLocationProvider::new(Duration::from_millis(
                config.sim_location_latency_ms(),
            ))),
            points: Arc::new(SimulatedRewardPointsProvider::new(Duration::from_millis(
                config.sim_points_latency_ms(),
            ))),
            attractions: Arc::new(StaticAttractionProvider::builtin()),
        }
    }
}

/// Outcome of one `track_all` round
#[derive(Debug)]
pub struct TrackReport {
    pub total: usize,
    pub tracked: usize,
    pub failures: Vec<TrackError>,
    pub elapsed: Duration,
}

impl TrackReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse per-user failures into a single `Aggregate` error
    pub fn into_result(self) -> Result<Self, TrackError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(TrackError::Aggregate { failed: self.failures.len(), total: self.total })
        }
    }
}

/// Tracking orchestrator
///
/// Cheap to clone; every clone shares the same caches, pools and engine.
#[derive(Clone)]
pub struct Tracker {
    /// Last known location per user, refreshed after the TTL
    locations: Arc<LocationCache>,
    /// Reward admission and calculation
    engine: Arc<RewardEngine>,
    /// Attraction list, fetched once
    catalog: Arc<AttractionCatalog>,
    /// Runs `track_one` per user during `track_all`
    pool: Arc<WorkerPool>,
    metrics: Arc<Metrics>,
    nearby_limit: usize,
}

impl Tracker {
    /// Wire up caches, pools and the reward engine from `config`
    ///
    /// Fails without spawning anything if `config` does not validate.
    pub fn new(config: &Config, providers: Providers, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        config.validate().context("Invalid tracker configuration")?;
        let Providers { location, points, attractions } = providers;

        let tracking_pool = Arc::new(WorkerPool::new("tracking", config.tracking_workers()));
        let reward_pool = Arc::new(WorkerPool::new("rewards", config.reward_workers()));

        let catalog = Arc::new(AttractionCatalog::new(attractions));
        let locations = Arc::new(LocationCache::new(location, config.location_ttl(), metrics.clone()));
        let rewards = Arc::new(RewardCache::new(points, reward_pool.clone(), metrics.clone()));
        let engine = Arc::new(RewardEngine::new(
            config,
            catalog.clone(),
            rewards,
            reward_pool,
            metrics.clone(),
        )?);

        info!(
            tracking_workers = %config.tracking_workers(),
            reward_workers = %config.reward_workers(),
            admission_permits = %config.admission_permits(),
            location_ttl_secs = %config.location_ttl().as_secs(),
            "tracker_initialized"
        );

        Ok(Self {
            locations,
            engine,
            catalog,
            pool: tracking_pool,
            metrics,
            nearby_limit: config.nearby_attractions_limit(),
        })
    }

    /// Refresh one user's location, record it and queue a reward calculation
    ///
    /// Waits for a reward admission permit but not for the calculation. If
    /// the engine refuses admission the location is still returned.
    pub async fn track_one(&self, user: &Arc<User>) -> Result<VisitedLocation, TrackError> {
        let user_id = user.id();
        let visited = self
            .locations
            .resolve(user_id)
            .await
            .map_err(|source| TrackError::Location { user_id, source })?;

        user.add_visited_location(visited.clone());
        self.metrics.record_user_tracked();

        if let Err(e) = self.engine.calculate_rewards(user.clone()).await {
            warn!(user_id = %user_id, error = %e, "reward_calculation_not_admitted");
        }

        Ok(visited)
    }

    /// Track every user concurrently on the tracking pool
    ///
    /// Every user is awaited; failures are collected in the report rather
    /// than cutting the round short.
    pub async fn track_all(&self, users: &[Arc<User>]) -> TrackReport {
        let start = Instant::now();

        let handles: Vec<_> = users
            .iter()
            .map(|user| {
                let tracker = self.clone();
                let user = user.clone();
                let user_id = user.id();
                (user_id, self.pool.submit(async move { tracker.track_one(&user).await }))
            })
            .collect();

        let mut tracked = 0;
        let mut failures = Vec::new();
        for (user_id, handle) in handles {
            match handle.await {
                Ok(Ok(_)) => tracked += 1,
                Ok(Err(e)) => failures.push(e),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "tracking_task_failed");
                    failures.push(TrackError::TaskFailed {
                        user_id,
                        source: PoolError::TaskFailed(e.to_string()),
                    });
                }
            }
        }

        let report = TrackReport { total: users.len(), tracked, failures, elapsed: start.elapsed() };
        info!(
            total = %report.total,
            tracked = %report.tracked,
            failed = %report.failures.len(),
            elapsed_ms = %report.elapsed.as_millis(),
            "track_all_completed"
        );
        report
    }

    /// Closest attractions to `location`, nearest first
    ///
    /// Ties keep catalog order.
    pub async fn nearby_attractions(&self, location: &Location) -> Result<Vec<Attraction>, ProviderError> {
        let attractions = self.catalog.list().await?;

        let mut by_distance: Vec<(f64, &Attraction)> =
            attractions.iter().map(|a| (distance(&a.location, location), a)).collect();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(by_distance.into_iter().take(self.nearby_limit).map(|(_, a)| a.clone()).collect())
    }

    /// Last known location, tracking the user if there is none yet
    pub async fn user_location(&self, user: &Arc<User>) -> Result<VisitedLocation, TrackError> {
        match user.last_visited_location() {
            Some(visited) => Ok(visited),
            None => self.track_one(user).await,
        }
    }

    pub fn user_rewards(&self, user: &User) -> Vec<UserReward> {
        user.rewards()
    }

    /// Track `users` every `period` until `shutdown` flips to true
    ///
    /// Returns the number of completed rounds.
    pub async fn run(&self, users: Vec<Arc<User>>, period: Duration, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut tick_interval = interval(period.max(Duration::from_millis(1)));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rounds = 0;

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let report = self.track_all(&users).await;
                    rounds += 1;
                    debug!(round = %rounds, tracked = %report.tracked, "tracking_round_done");
                }
                changed = shutdown.changed() => {
                    // Sender gone counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(rounds = %rounds, "tracking_loop_stopped");
        rounds
    }

    /// Stop reward admission and wait for both pools to drain
    ///
    /// `timeout` bounds the whole teardown. Returns false if any work was
    /// still outstanding at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        self.engine.shutdown();

        let tracking_idle = self.pool.wait_idle(timeout).await;
        let rewards_idle = self.engine.await_termination(timeout.saturating_sub(start.elapsed())).await;

        info!(
            tracking_idle = %tracking_idle,
            rewards_idle = %rewards_idle,
            elapsed_ms = %start.elapsed().as_millis(),
            "tracker_shutdown"
        );
        tracking_idle && rewards_idle
    }

    pub fn engine(&self) -> &Arc<RewardEngine> {
        &self.engine
    }

    pub fn location_cache(&self) -> &Arc<LocationCache> {
        &self.locations
    }

    pub fn reward_cache(&self) -> &Arc<RewardCache> {
        self.engine.reward_cache()
    }

    pub fn catalog(&self) -> &Arc<AttractionCatalog> {
        &self.catalog
    }

    pub fn tracking_pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
