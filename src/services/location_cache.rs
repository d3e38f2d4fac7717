//! TTL-gated cache of each user's last known location
//!
//! The map lock is only held long enough to find a user's slot. Refreshes
//! run under the per-user async lock, so a slow provider call for one user
//! never blocks lookups for anyone else, and two concurrent misses for the
//! same user collapse into one provider call.

use crate::domain::types::{CachedLocation, UserId, VisitedLocation};
use crate::error::ProviderError;
use crate::infra::metrics::Metrics;
use crate::io::providers::LocationProvider;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type Slot = Arc<tokio::sync::Mutex<Option<CachedLocation>>>;

pub struct LocationCache {
    provider: Arc<dyn LocationProvider>,
    ttl: Duration,
    slots: Mutex<FxHashMap<UserId, Slot>>,
    metrics: Arc<Metrics>,
}

impl LocationCache {
    pub fn new(provider: Arc<dyn LocationProvider>, ttl: Duration, metrics: Arc<Metrics>) -> Self {
        Self { provider, ttl, slots: Mutex::new(FxHashMap::default()), metrics }
    }

    fn slot(&self, user_id: UserId) -> Slot {
        self.slots.lock().entry(user_id).or_default().clone()
    }

    /// Return the user's location, refreshing it if missing or expired
    ///
    /// An entry is never returned once its age reaches the TTL. On provider
    /// failure the error is returned and nothing is written.
    pub async fn resolve(&self, user_id: UserId) -> Result<VisitedLocation, ProviderError> {
        let slot = self.slot(user_id);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().filter(|c| !c.is_expired(self.ttl)) {
            self.metrics.record_location_lookup(true);
            return Ok(cached.visited.clone());
        }

        self.metrics.record_location_lookup(false);
        let start = Instant::now();
        match self.provider.current_location(user_id).await {
            Ok(visited) => {
                debug!(
                    user_id = %user_id,
                    latency_ms = %start.elapsed().as_millis(),
                    "location_refreshed"
                );
                *entry = Some(CachedLocation::new(visited.clone()));
                Ok(visited)
            }
            Err(e) => {
                self.metrics.record_location_failure();
                warn!(user_id = %user_id, error = %e, "location_refresh_failed");
                Err(e)
            }
        }
    }

    /// Fresh cached location without touching the provider
    ///
    /// Returns None while a refresh for this user is in progress.
    pub fn peek(&self, user_id: UserId) -> Option<VisitedLocation> {
        let slot = self.slots.lock().get(&user_id).cloned()?;
        let entry = slot.try_lock().ok()?;
        entry.as_ref().filter(|c| !c.is_expired(self.ttl)).map(|c| c.visited.clone())
    }

    pub fn invalidate(&self, user_id: UserId) {
        self.slots.lock().remove(&user_id);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
