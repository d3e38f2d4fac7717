//! Single-flight memoization of reward points per (attraction, user)
//!
//! The first request for a key inserts a pending slot and submits exactly one
//! provider call to the reward pool. Later requests attach to the same
//! pending result or read the cached value.
//!
//! Failure policy: the failed outcome is broadcast to every waiter of that
//! flight and the slot is evicted, so the next request starts a fresh call.

use crate::domain::types::{AttractionId, UserId};
use crate::error::ProviderError;
use crate::infra::metrics::Metrics;
use crate::io::providers::RewardPointsProvider;
use crate::services::pool::WorkerPool;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, warn};

pub type PointsResult = Result<i32, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RewardKey {
    pub attraction_id: AttractionId,
    pub user_id: UserId,
}

enum Slot {
    Ready(i32),
    Pending(watch::Receiver<Option<PointsResult>>),
}

type Slots = Arc<Mutex<FxHashMap<RewardKey, Slot>>>;

/// Handle to a cached or in-flight points computation
pub struct PointsHandle {
    state: HandleState,
}

enum HandleState {
    Ready(i32),
    Pending(watch::Receiver<Option<PointsResult>>),
}

impl PointsHandle {
    /// Wait for the computation this handle is attached to
    pub async fn wait(self) -> PointsResult {
        match self.state {
            HandleState::Ready(points) => Ok(points),
            HandleState::Pending(mut rx) => rx
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|outcome| (*outcome).clone())
                .unwrap_or_else(|| {
                    Err(ProviderError::Unavailable("points computation abandoned".to_string()))
                }),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }
}

/// One in-flight provider call for a key
///
/// Dropping an unsettled flight (provider panic, task dropped before running)
/// evicts the slot before the sender goes away, so waiters woken by the
/// closed channel never observe a stale pending entry.
struct Flight {
    key: RewardKey,
    slots: Slots,
    tx: Option<watch::Sender<Option<PointsResult>>>,
}

impl Flight {
    /// Publish the outcome: cache on success, evict on failure, then wake waiters
    fn settle(mut self, result: PointsResult) {
        {
            let mut slots = self.slots.lock();
            match &result {
                Ok(points) => {
                    slots.insert(self.key, Slot::Ready(*points));
                }
                Err(_) => {
                    slots.remove(&self.key);
                }
            }
        }
        if let Some(tx) = self.tx.take() {
            // Waiters may all have gone away; nothing to do then
            let _ = tx.send(Some(result));
        }
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.slots.lock().remove(&self.key);
        }
    }
}

pub struct RewardCache {
    provider: Arc<dyn RewardPointsProvider>,
    pool: Arc<WorkerPool>,
    slots: Slots,
    metrics: Arc<Metrics>,
}

impl RewardCache {
    pub fn new(
        provider: Arc<dyn RewardPointsProvider>,
        pool: Arc<WorkerPool>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { provider, pool, slots: Arc::new(Mutex::new(FxHashMap::default())), metrics }
    }

    /// Points for the pair, computing them at most once
    ///
    /// Never runs the provider on the calling task; a miss submits the call
    /// to the reward pool. Must be called from within a tokio runtime.
    pub fn get_points(&self, attraction_id: AttractionId, user_id: UserId) -> PointsHandle {
        let key = RewardKey { attraction_id, user_id };

        let rx = {
            let mut slots = self.slots.lock();
            match slots.get(&key) {
                Some(Slot::Ready(points)) => {
                    self.metrics.record_points_cache_hit();
                    return PointsHandle { state: HandleState::Ready(*points) };
                }
                Some(Slot::Pending(rx)) => {
                    self.metrics.record_points_cache_hit();
                    return PointsHandle { state: HandleState::Pending(rx.clone()) };
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    slots.insert(key, Slot::Pending(rx.clone()));
                    self.start_flight(key, tx);
                    rx
                }
            }
        };

        PointsHandle { state: HandleState::Pending(rx) }
    }

    fn start_flight(&self, key: RewardKey, tx: watch::Sender<Option<PointsResult>>) {
        let provider = self.provider.clone();
        let metrics = self.metrics.clone();
        let flight = Flight { key, slots: self.slots.clone(), tx: Some(tx) };

        self.pool.submit(async move {
            let start = Instant::now();
            let result = provider.attraction_reward_points(key.attraction_id, key.user_id).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            metrics.record_points_call(latency_ms, result.is_ok());

            match &result {
                Ok(points) => debug!(
                    attraction_id = %key.attraction_id,
                    user_id = %key.user_id,
                    points = %points,
                    latency_ms = %latency_ms,
                    "reward_points_computed"
                ),
                Err(e) => warn!(
                    attraction_id = %key.attraction_id,
                    user_id = %key.user_id,
                    error = %e,
                    "reward_points_failed"
                ),
            }

            flight.settle(result);
        });
    }

    /// Cached points for a completed computation, if any
    pub fn cached_points(&self, attraction_id: AttractionId, user_id: UserId) -> Option<i32> {
        match self.slots.lock().get(&RewardKey { attraction_id, user_id }) {
            Some(Slot::Ready(points)) => Some(*points),
            _ => None,
        }
    }

    /// Number of cached or in-flight keys
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
