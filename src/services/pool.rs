//! Bounded worker pool on top of the tokio runtime
//!
//! Each submitted task is spawned immediately but only runs its body once it
//! holds one of `capacity` worker slots. An in-flight counter (published over
//! a `watch` channel) lets callers wait for the pool to drain with a deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

/// Decrements the in-flight count when the task finishes or is dropped
struct InFlightGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl InFlightGuard {
    fn enter(in_flight: Arc<watch::Sender<usize>>) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self { in_flight }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

pub struct WorkerPool {
    name: &'static str,
    capacity: usize,
    workers: Arc<Semaphore>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl WorkerPool {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (in_flight, _) = watch::channel(0);
        Self {
            name,
            capacity,
            workers: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(in_flight),
        }
    }

    /// Queue a task; it starts once a worker slot is free
    ///
    /// Must be called from within a tokio runtime. The task counts as in
    /// flight from this call until it completes.
    pub fn submit<F, T>(&self, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = InFlightGuard::enter(self.in_flight.clone());
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let _guard = guard;
            // The semaphore is never closed, so this only waits for a slot
            let _worker = workers.acquire_owned().await;
            task.await
        })
    }

    /// Wait until no task is queued or running, up to `timeout`
    ///
    /// Returns false if work was still outstanding at the deadline. That
    /// work is left running, not aborted.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.in_flight.subscribe();
        let drained = tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .map(|res| res.is_ok())
            .unwrap_or(false);

        debug!(pool = %self.name, drained = %drained, in_flight = %self.in_flight(), "pool_wait_idle");
        drained
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Worker slots not currently held by a running task
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
