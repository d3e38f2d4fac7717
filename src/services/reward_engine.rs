//! Reward calculation with admission control
//!
//! `calculate_rewards` waits only for an admission permit, then hands the
//! work to the reward pool and returns. The permit travels with the task and
//! is released when the task ends, however it ends. Admission permits are
//! kept below the pool's worker count so running reward tasks can never
//! occupy every worker while they wait on the points calls they spawned.

use crate::domain::types::{Attraction, Location, UserReward, VisitedLocation};
use crate::domain::user::User;
use crate::error::RewardError;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::catalog::AttractionCatalog;
use crate::services::geometry::distance;
use crate::services::pool::WorkerPool;
use crate::services::reward_cache::{PointsHandle, RewardCache};
use anyhow::{ensure, Context};
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Proximity buffer shared by every reward calculation in the process
///
/// Stored as the bit pattern of an `f64` so reads stay lock-free.
struct ProximityBuffer {
    bits: AtomicU64,
    default_miles: f64,
}

impl ProximityBuffer {
    fn new(default_miles: f64) -> Self {
        Self { bits: AtomicU64::new(default_miles.to_bits()), default_miles }
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn set(&self, miles: f64) {
        self.bits.store(miles.to_bits(), Ordering::Relaxed);
    }

    fn reset(&self) {
        self.set(self.default_miles);
    }
}

pub struct RewardEngine {
    catalog: Arc<AttractionCatalog>,
    rewards: Arc<RewardCache>,
    pool: Arc<WorkerPool>,
    admission: Arc<Semaphore>,
    admission_timeout: Option<Duration>,
    proximity_buffer: ProximityBuffer,
    attraction_proximity_miles: f64,
    metrics: Arc<Metrics>,
}

impl RewardEngine {
    /// Build an engine running on `pool`
    ///
    /// Fails if `config` is invalid or if its admission permits would not
    /// leave `pool` a spare worker for points calls.
    pub fn new(
        config: &Config,
        catalog: Arc<AttractionCatalog>,
        rewards: Arc<RewardCache>,
        pool: Arc<WorkerPool>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid reward engine configuration")?;
        ensure!(
            config.admission_permits() < pool.capacity(),
            "admission permits ({}) must be below the {} pool capacity ({})",
            config.admission_permits(),
            pool.name(),
            pool.capacity()
        );

        Ok(Self {
            catalog,
            rewards,
            pool,
            admission: Arc::new(Semaphore::new(config.admission_permits())),
            admission_timeout: config.admission_timeout(),
            proximity_buffer: ProximityBuffer::new(config.proximity_buffer_miles()),
            attraction_proximity_miles: config.attraction_proximity_miles(),
            metrics,
        })
    }

    /// Queue a reward calculation for `user`
    ///
    /// Blocks only until an admission permit is available; the calculation
    /// itself runs on the reward pool and its results show up on the user
    /// later. Fails once the engine is shut down, or if a configured
    /// admission timeout elapses first.
    pub async fn calculate_rewards(&self, user: Arc<User>) -> Result<(), RewardError> {
        let permit = match self.acquire_permit().await {
            Ok(permit) => permit,
            Err(e) => {
                self.metrics.record_admission_rejected();
                debug!(user_id = %user.id(), error = %e, "reward_admission_rejected");
                return Err(e);
            }
        };

        let task = RewardTask {
            catalog: self.catalog.clone(),
            rewards: self.rewards.clone(),
            metrics: self.metrics.clone(),
            proximity_buffer: self.proximity_buffer.get(),
            user,
        };

        self.metrics.record_reward_task_submitted();
        let metrics = self.metrics.clone();
        self.pool.submit(async move {
            let _permit = permit;
            task.run().await;
            metrics.record_reward_task_completed();
        });

        Ok(())
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, RewardError> {
        let acquire = self.admission.clone().acquire_owned();
        let acquired = match self.admission_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| RewardError::AdmissionTimeout(timeout))?,
            None => acquire.await,
        };
        // Only fails once the semaphore is closed by shutdown
        acquired.map_err(|_| RewardError::ShuttingDown)
    }

    /// Whether `location` is close enough to recommend `attraction`
    pub fn is_within_attraction_proximity(&self, attraction: &Attraction, location: &Location) -> bool {
        distance(&attraction.location, location) <= self.attraction_proximity_miles
    }

    /// Whether a visit is close enough to `attraction` to earn its reward
    pub fn near_attraction(&self, visited: &VisitedLocation, attraction: &Attraction) -> bool {
        distance(&attraction.location, &visited.location) <= self.proximity_buffer.get()
    }

    /// Change the reward-eligibility radius for all later calculations
    ///
    /// NaN, infinite and negative radii are ignored.
    pub fn set_proximity_buffer(&self, miles: f64) {
        if !miles.is_finite() || miles < 0.0 {
            warn!(miles = %miles, current = %self.proximity_buffer.get(), "proximity_buffer_rejected");
            return;
        }
        info!(miles = %miles, "proximity_buffer_set");
        self.proximity_buffer.set(miles);
    }

    pub fn reset_proximity_buffer(&self) {
        self.proximity_buffer.reset();
    }

    pub fn proximity_buffer(&self) -> f64 {
        self.proximity_buffer.get()
    }

    /// Stop admitting new calculations
    ///
    /// Callers waiting for a permit are released with `ShuttingDown`.
    /// Already admitted work keeps running.
    pub fn shutdown(&self) {
        if !self.admission.is_closed() {
            self.admission.close();
            info!(outstanding = %self.pool.in_flight(), "reward_engine_shutdown");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.admission.is_closed()
    }

    /// Stop admitting and wait for outstanding work, up to `timeout`
    ///
    /// Returns false if work was still running at the deadline; that work
    /// is abandoned, not cancelled.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        self.shutdown();
        self.pool.wait_idle(timeout).await
    }

    /// Finish a batch: stop admitting, drain, and log how it went
    pub async fn await_completion(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let completed = self.await_termination(timeout).await;
        if completed {
            info!(elapsed_ms = %start.elapsed().as_millis(), "reward_engine_drained");
        } else {
            warn!(
                timeout_ms = %timeout.as_millis(),
                outstanding = %self.pool.in_flight(),
                "reward_engine_drain_timeout"
            );
        }
        completed
    }

    /// Reward tasks and points calls queued or running
    pub fn outstanding(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn available_permits(&self) -> usize {
        self.admission.available_permits()
    }

    pub fn reward_cache(&self) -> &Arc<RewardCache> {
        &self.rewards
    }
}

/// One admitted reward calculation for one user
struct RewardTask {
    catalog: Arc<AttractionCatalog>,
    rewards: Arc<RewardCache>,
    metrics: Arc<Metrics>,
    proximity_buffer: f64,
    user: Arc<User>,
}

impl RewardTask {
    async fn run(self) {
        let user_id = self.user.id();
        let attractions = match self.catalog.list().await {
            Ok(attractions) => attractions,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "reward_task_catalog_unavailable");
                return;
            }
        };

        let history = self.user.visited_locations();
        let mut pending: Vec<(VisitedLocation, &Attraction, PointsHandle)> = Vec::new();
        // Names already requested by this task; later visits would only
        // attach to the same computation and lose the append race anyway
        let mut requested: FxHashSet<&str> = FxHashSet::default();

        for visited in &history {
            for attraction in attractions.iter() {
                if requested.contains(attraction.name.as_str())
                    || self.user.has_reward_for(&attraction.name)
                {
                    continue;
                }
                if distance(&attraction.location, &visited.location) > self.proximity_buffer {
                    continue;
                }

                requested.insert(attraction.name.as_str());
                let handle = self.rewards.get_points(attraction.id, user_id);
                pending.push((visited.clone(), attraction, handle));
            }
        }

        let candidates = pending.len();
        let mut granted = 0usize;
        for (visited, attraction, handle) in pending {
            match handle.wait().await {
                Ok(points) => {
                    if self.user.add_reward(UserReward::new(visited, attraction.clone(), points)) {
                        granted += 1;
                        self.metrics.record_reward_granted();
                        debug!(
                            user_id = %user_id,
                            attraction = %attraction.name,
                            points = %points,
                            "reward_granted"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        attraction = %attraction.name,
                        error = %e,
                        "reward_skipped_points_unavailable"
                    );
                }
            }
        }

        debug!(
            user_id = %user_id,
            visits = %history.len(),
            candidates = %candidates,
            granted = %granted,
            "reward_task_completed"
        );
    }
}
