//! Configuration loading from TOML files
//!
//! The binary picks the file from `--config`, then the CONFIG_FILE
//! environment variable, then `config/dev.toml`. Only a missing file falls
//! back to built-in defaults.

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Worker count of the location tracking pool
    #[serde(default = "default_tracking_workers")]
    pub workers: usize,
    /// Maximum age of a cached location before it is refreshed
    #[serde(default = "default_location_ttl_secs")]
    pub location_ttl_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { workers: default_tracking_workers(), location_ttl_secs: default_location_ttl_secs() }
    }
}

fn default_tracking_workers() -> usize {
    100
}

fn default_location_ttl_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardsConfig {
    /// Worker count of the reward pool (engine tasks and points calls)
    #[serde(default = "default_reward_workers")]
    pub workers: usize,
    /// Concurrent reward computations admitted; must be below `workers`
    #[serde(default = "default_admission_permits")]
    pub admission_permits: usize,
    /// Bound on waiting for an admission permit (0 = wait forever)
    #[serde(default)]
    pub admission_timeout_ms: u64,
    #[serde(default = "default_proximity_buffer_miles")]
    pub proximity_buffer_miles: f64,
    #[serde(default = "default_attraction_proximity_miles")]
    pub attraction_proximity_miles: f64,
    #[serde(default = "default_nearby_attractions_limit")]
    pub nearby_attractions_limit: usize,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            workers: default_reward_workers(),
            admission_permits: default_admission_permits(),
            admission_timeout_ms: 0,
            proximity_buffer_miles: default_proximity_buffer_miles(),
            attraction_proximity_miles: default_attraction_proximity_miles(),
            nearby_attractions_limit: default_nearby_attractions_limit(),
        }
    }
}

fn default_reward_workers() -> usize {
    200
}

fn default_admission_permits() -> usize {
    75
}

fn default_proximity_buffer_miles() -> f64 {
    10.0
}

fn default_attraction_proximity_miles() -> f64 {
    200.0
}

fn default_nearby_attractions_limit() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Number of synthetic users to generate
    #[serde(default = "default_sim_users")]
    pub users: usize,
    /// Visited locations pre-populated per synthetic user
    #[serde(default = "default_history_per_user")]
    pub history_per_user: usize,
    /// Simulated latency of the location provider
    #[serde(default = "default_location_latency_ms")]
    pub location_latency_ms: u64,
    /// Simulated latency of the reward points provider
    #[serde(default = "default_points_latency_ms")]
    pub points_latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            users: default_sim_users(),
            history_per_user: default_history_per_user(),
            location_latency_ms: default_location_latency_ms(),
            points_latency_ms: default_points_latency_ms(),
        }
    }
}

fn default_sim_users() -> usize {
    100
}

fn default_history_per_user() -> usize {
    3
}

fn default_location_latency_ms() -> u64 {
    30
}

fn default_points_latency_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    tracking_workers: usize,
    location_ttl: Duration,
    reward_workers: usize,
    admission_permits: usize,
    admission_timeout: Option<Duration>,
    proximity_buffer_miles: f64,
    attraction_proximity_miles: f64,
    nearby_attractions_limit: usize,
    sim_users: usize,
    sim_history_per_user: usize,
    sim_location_latency_ms: u64,
    sim_points_latency_ms: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { tracking, rewards, simulation, metrics } = toml_config;
        Self {
            tracking_workers: tracking.workers,
            location_ttl: Duration::from_secs(tracking.location_ttl_secs),
            reward_workers: rewards.workers,
            admission_permits: rewards.admission_permits,
            admission_timeout: (rewards.admission_timeout_ms > 0)
                .then(|| Duration::from_millis(rewards.admission_timeout_ms)),
            proximity_buffer_miles: rewards.proximity_buffer_miles,
            attraction_proximity_miles: rewards.attraction_proximity_miles,
            nearby_attractions_limit: rewards.nearby_attractions_limit,
            sim_users: simulation.users,
            sim_history_per_user: simulation.history_per_user,
            sim_location_latency_ms: simulation.location_latency_ms,
            sim_points_latency_ms: simulation.points_latency_ms,
            metrics_interval_secs: metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from `path`, using defaults only if the file is missing
    ///
    /// A file that exists but cannot be read, parsed or validated is an error.
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        match Self::from_file(path) {
            Ok(config) => Ok(config),
            Err(e) if is_not_found(&e) => {
                warn!(path = %path, "config_file_missing_using_defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Check pool sizing invariants
    ///
    /// Reward tasks hold a reward worker while awaiting points calls that need
    /// a reward worker of their own, so permits must stay below worker count.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.tracking_workers > 0, "tracking.workers must be at least 1");
        ensure!(self.admission_permits > 0, "rewards.admission_permits must be at least 1");
        ensure!(
            self.admission_permits < self.reward_workers,
            "rewards.admission_permits ({}) must be below rewards.workers ({})",
            self.admission_permits,
            self.reward_workers
        );
        ensure!(
            self.proximity_buffer_miles.is_finite() && self.proximity_buffer_miles >= 0.0,
            "rewards.proximity_buffer_miles must be a non-negative number"
        );
        Ok(())
    }

    // Getters for all config fields
    pub fn tracking_workers(&self) -> usize {
        self.tracking_workers
    }

    pub fn location_ttl(&self) -> Duration {
        self.location_ttl
    }

    pub fn reward_workers(&self) -> usize {
        self.reward_workers
    }

    pub fn admission_permits(&self) -> usize {
        self.admission_permits
    }

    pub fn admission_timeout(&self) -> Option<Duration> {
        self.admission_timeout
    }

    pub fn proximity_buffer_miles(&self) -> f64 {
        self.proximity_buffer_miles
    }

    pub fn attraction_proximity_miles(&self) -> f64 {
        self.attraction_proximity_miles
    }

    pub fn nearby_attractions_limit(&self) -> usize {
        self.nearby_attractions_limit
    }

    pub fn sim_users(&self) -> usize {
        self.sim_users
    }

    pub fn sim_history_per_user(&self) -> usize {
        self.sim_history_per_user
    }

    pub fn sim_location_latency_ms(&self) -> u64 {
        self.sim_location_latency_ms
    }

    pub fn sim_points_latency_ms(&self) -> u64 {
        self.sim_points_latency_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the pool sizes
    pub fn with_pools(mut self, tracking_workers: usize, reward_workers: usize, admission_permits: usize) -> Self {
        self.tracking_workers = tracking_workers;
        self.reward_workers = reward_workers;
        self.admission_permits = admission_permits;
        self
    }

    pub fn with_location_ttl(mut self, ttl: Duration) -> Self {
        self.location_ttl = ttl;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }

    pub fn with_sim_users(mut self, users: usize) -> Self {
        self.sim_users = users;
        self
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.root_cause()
        .downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracking_workers(), 100);
        assert_eq!(config.reward_workers(), 200);
        assert_eq!(config.admission_permits(), 75);
        assert_eq!(config.admission_timeout(), None);
        assert_eq!(config.location_ttl(), Duration::from_secs(60));
        assert_eq!(config.proximity_buffer_miles(), 10.0);
        assert_eq!(config.attraction_proximity_miles(), 200.0);
        assert_eq!(config.nearby_attractions_limit(), 5);
        assert_eq!(config.config_file(), "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_permits_at_worker_count() {
        let config = Config::default().with_pools(4, 8, 8);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be below rewards.workers"));
    }

    #[test]
    fn test_validate_rejects_zero_tracking_workers() {
        let config = Config::default().with_pools(0, 8, 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_admission_timeout_means_unbounded() {
        let toml_config: TomlConfig = toml::from_str("[rewards]\nadmission_timeout_ms = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.admission_timeout(), None);

        let toml_config: TomlConfig = toml::from_str("[rewards]\nadmission_timeout_ms = 250\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.admission_timeout(), Some(Duration::from_millis(250)));
    }
}
