//! TourGuide - location tracking and rewards simulator
//!
//! Drives the tracking and rewards pipeline against simulated providers:
//! generates synthetic users, tracks them all, computes their rewards and
//! reports how long each phase took.
//!
//! Module structure:
//! - `domain/` - Core types (User, Attraction, VisitedLocation, UserReward)
//! - `io/` - Provider traits, simulated providers, rewards egress
//! - `services/` - Pipeline (Tracker, RewardEngine, caches, pools)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tourguide::infra::{Config, Metrics};
use tourguide::io::{generate_users, RewardsEgress};
use tourguide::services::{Providers, Tracker};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Upper bound on waiting for outstanding work at the end of a run
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// TourGuide - tracking and rewards pipeline simulator
#[derive(Parser, Debug)]
#[command(name = "tourguide", version, about)]
struct Args {
    /// Path to TOML configuration file; defaults apply if the file is missing
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Number of synthetic users (overrides [simulation] users)
    #[arg(short, long)]
    users: Option<usize>,

    /// Keep tracking periodically until Ctrl+C instead of a single batch
    #[arg(long)]
    watch: bool,

    /// Seconds between tracking rounds in --watch mode
    #[arg(long, default_value_t = 5)]
    period_secs: u64,

    /// Append each user's rewards as JSONL to this file when the run ends
    #[arg(long)]
    rewards_file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "tourguide starting");

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if let Some(users) = args.users {
        config = config.with_sim_users(users);
    }
    config.validate().context("Invalid configuration")?;

    info!(
        config_file = %config.config_file(),
        users = %config.sim_users(),
        tracking_workers = %config.tracking_workers(),
        reward_workers = %config.reward_workers(),
        admission_permits = %config.admission_permits(),
        location_ttl_secs = %config.location_ttl().as_secs(),
        proximity_buffer_miles = %config.proximity_buffer_miles(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    // Periodic metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let tracker = Tracker::new(&config, Providers::simulated(&config), metrics.clone())?;
    let users = generate_users(config.sim_users(), config.sim_history_per_user());
    info!(users = %users.len(), history_per_user = %config.sim_history_per_user(), "users_generated");

    if args.watch {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown_signal_received");
            let _ = shutdown_tx.send(true);
        });

        tracker.run(users.clone(), Duration::from_secs(args.period_secs.max(1)), shutdown_rx).await;
    } else {
        let report = tracker.track_all(&users).await;
        if let Err(e) = report.into_result() {
            warn!(error = %e, "tracking_incomplete");
        }

        let start = Instant::now();
        for user in &users {
            if let Err(e) = tracker.engine().calculate_rewards(user.clone()).await {
                warn!(user_id = %user.id(), error = %e, "reward_calculation_not_admitted");
            }
        }
        info!(
            users = %users.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "reward_calculations_admitted"
        );
    }

    let start = Instant::now();
    let drained = tracker.shutdown(DRAIN_TIMEOUT).await;
    if !drained {
        warn!(timeout_secs = %DRAIN_TIMEOUT.as_secs(), "shutdown_timed_out");
    }

    let rewarded = users.iter().filter(|u| u.reward_count() > 0).count();
    let total_points: i64 = users.iter().map(|u| u.total_reward_points()).sum();
    info!(
        users = %users.len(),
        rewarded_users = %rewarded,
        total_points = %total_points,
        drain_ms = %start.elapsed().as_millis(),
        "run_summary"
    );
    metrics.report().log();

    if let Some(path) = args.rewards_file.as_deref() {
        RewardsEgress::new(path).write_users(&users);
    }

    info!("tourguide shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_from_flag_env_or_default() {
        std::env::remove_var("CONFIG_FILE");
        let args = Args::try_parse_from(["tourguide"]).unwrap();
        assert_eq!(args.config, "config/dev.toml");

        std::env::set_var("CONFIG_FILE", "config/load.toml");
        let args = Args::try_parse_from(["tourguide"]).unwrap();
        assert_eq!(args.config, "config/load.toml");

        let args = Args::try_parse_from(["tourguide", "--config", "config/other.toml"]).unwrap();
        assert_eq!(args.config, "config/other.toml");
        std::env::remove_var("CONFIG_FILE");
    }
}
