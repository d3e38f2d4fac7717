//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that resets anything (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for provider latency (milliseconds)
/// Buckets: ≤1, ≤2, ≤4, ≤8, ≤16, ≤32, ≤64, ≤128, ≤256, ≤512, >512
const BUCKET_BOUNDS: [u64; 10] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512];
const NUM_BUCKETS: usize = 11;

/// Upper bounds for each bucket (last bucket uses 2x the previous bound)
const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector shared by the caches, engine and tracker
pub struct Metrics {
    /// Location lookups served from cache (monotonic)
    location_cache_hits: AtomicU64,
    /// Location lookups that called the provider (monotonic)
    location_cache_misses: AtomicU64,
    /// Location provider failures (monotonic)
    location_failures: AtomicU64,
    /// Users tracked successfully (monotonic)
    users_tracked: AtomicU64,
    /// Reward tasks admitted (monotonic)
    reward_tasks_submitted: AtomicU64,
    /// Reward tasks finished, successfully or not (monotonic)
    reward_tasks_completed: AtomicU64,
    /// Admission attempts rejected by timeout or shutdown (monotonic)
    admissions_rejected: AtomicU64,
    /// Points provider invocations (monotonic)
    points_calls: AtomicU64,
    /// Points provider failures (monotonic)
    points_failures: AtomicU64,
    /// Points requests answered by a cached or in-flight computation (monotonic)
    points_cache_hits: AtomicU64,
    /// Rewards appended to users (monotonic)
    rewards_granted: AtomicU64,
    /// Points provider latency histogram (reset on report)
    points_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of points provider latencies in ms (reset on report)
    points_latency_sum_ms: AtomicU64,
    /// Max points provider latency in ms (reset on report)
    points_latency_max_ms: AtomicU64,
    /// Points calls since last report (reset on report)
    points_calls_since_report: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            location_cache_hits: AtomicU64::new(0),
            location_cache_misses: AtomicU64::new(0),
            location_failures: AtomicU64::new(0),
            users_tracked: AtomicU64::new(0),
            reward_tasks_submitted: AtomicU64::new(0),
            reward_tasks_completed: AtomicU64::new(0),
            admissions_rejected: AtomicU64::new(0),
            points_calls: AtomicU64::new(0),
            points_failures: AtomicU64::new(0),
            points_cache_hits: AtomicU64::new(0),
            rewards_granted: AtomicU64::new(0),
            points_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            points_latency_sum_ms: AtomicU64::new(0),
            points_latency_max_ms: AtomicU64::new(0),
            points_calls_since_report: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_location_lookup(&self, cache_hit: bool) {
        if cache_hit {
            self.location_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.location_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_location_failure(&self) {
        self.location_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_user_tracked(&self) {
        self.users_tracked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reward_task_submitted(&self) {
        self.reward_tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reward_task_completed(&self) {
        self.reward_tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_admission_rejected(&self) {
        self.admissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one points provider call and its latency (lock-free)
    #[inline]
    pub fn record_points_call(&self, latency_ms: u64, ok: bool) {
        self.points_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.points_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.points_calls_since_report.fetch_add(1, Ordering::Relaxed);
        self.points_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.points_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.points_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_points_cache_hit(&self) {
        self.points_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reward_granted(&self) {
        self.rewards_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn points_calls(&self) -> u64 {
        self.points_calls.load(Ordering::Relaxed)
    }

    pub fn rewards_granted(&self) -> u64 {
        self.rewards_granted.load(Ordering::Relaxed)
    }

    pub fn location_cache_hits(&self) -> u64 {
        self.location_cache_hits.load(Ordering::Relaxed)
    }

    pub fn reward_tasks_completed(&self) -> u64 {
        self.reward_tasks_completed.load(Ordering::Relaxed)
    }

    /// Generate a summary report
    ///
    /// Monotonic counters are loaded; the latency histogram is swapped to
    /// zero so each report covers the interval since the previous one.
    pub fn report(&self) -> MetricsSummary {
        let latency_buckets = swap_buckets(&self.points_latency_buckets);
        let latency_sum = self.points_latency_sum_ms.swap(0, Ordering::Relaxed);
        let latency_max = self.points_latency_max_ms.swap(0, Ordering::Relaxed);
        let interval_calls = self.points_calls_since_report.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let points_calls_per_sec = if elapsed.as_secs_f64() > 0.0 {
            interval_calls as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            location_cache_hits: self.location_cache_hits.load(Ordering::Relaxed),
            location_cache_misses: self.location_cache_misses.load(Ordering::Relaxed),
            location_failures: self.location_failures.load(Ordering::Relaxed),
            users_tracked: self.users_tracked.load(Ordering::Relaxed),
            reward_tasks_submitted: self.reward_tasks_submitted.load(Ordering::Relaxed),
            reward_tasks_completed: self.reward_tasks_completed.load(Ordering::Relaxed),
            admissions_rejected: self.admissions_rejected.load(Ordering::Relaxed),
            points_calls: self.points_calls.load(Ordering::Relaxed),
            points_failures: self.points_failures.load(Ordering::Relaxed),
            points_cache_hits: self.points_cache_hits.load(Ordering::Relaxed),
            rewards_granted: self.rewards_granted.load(Ordering::Relaxed),
            points_calls_per_sec,
            points_latency_buckets: latency_buckets,
            points_latency_avg_ms: if interval_calls > 0 { latency_sum / interval_calls } else { 0 },
            points_latency_max_ms: latency_max,
            points_latency_p50_ms: percentile_from_buckets(&latency_buckets, 0.50),
            points_latency_p99_ms: percentile_from_buckets(&latency_buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub location_cache_hits: u64,
    pub location_cache_misses: u64,
    pub location_failures: u64,
    pub users_tracked: u64,
    pub reward_tasks_submitted: u64,
    pub reward_tasks_completed: u64,
    pub admissions_rejected: u64,
    pub points_calls: u64,
    pub points_failures: u64,
    pub points_cache_hits: u64,
    pub rewards_granted: u64,
    pub points_calls_per_sec: f64,
    /// Bounds: ≤1, ≤2, ≤4, ≤8, ≤16, ≤32, ≤64, ≤128, ≤256, ≤512, >512 ms
    pub points_latency_buckets: [u64; NUM_BUCKETS],
    pub points_latency_avg_ms: u64,
    pub points_latency_max_ms: u64,
    pub points_latency_p50_ms: u64,
    pub points_latency_p99_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            users_tracked = %self.users_tracked,
            location_hits = %self.location_cache_hits,
            location_misses = %self.location_cache_misses,
            location_failures = %self.location_failures,
            reward_tasks = %self.reward_tasks_submitted,
            reward_tasks_done = %self.reward_tasks_completed,
            admissions_rejected = %self.admissions_rejected,
            points_calls = %self.points_calls,
            points_failures = %self.points_failures,
            points_cache_hits = %self.points_cache_hits,
            points_per_sec = format!("{:.1}", self.points_calls_per_sec),
            points_p50_ms = %self.points_latency_p50_ms,
            points_p99_ms = %self.points_latency_p99_ms,
            rewards_granted = %self.rewards_granted,
            "metrics"
        );
    }
}
