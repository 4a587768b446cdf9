//! Actor - self-play episode runner for the Descent engine
//!
//! A long-running process that:
//! 1. Loads the value network (or falls back to the uniform evaluator)
//! 2. Runs descent self-play episodes across a pool of worker threads
//! 3. Records (position, value) training samples to per-worker SQLite
//!    replay stores, back-filling outcomes at episode end
//! 4. Keeps the per-position novelty counters up to date

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod central_config;
mod config;
mod model;
mod novelty;
mod replay;
mod selfplay;
mod stats;

use crate::config::Config;

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;
    init_tracing(&config.log_level)?;

    let max_episode_description = if config.max_episodes < 0 {
        "unlimited".to_string()
    } else {
        config.max_episodes.to_string()
    };
    info!(
        actor_id = %config.actor_id,
        workers = config.num_workers,
        "starting self-play actor for {} episodes",
        max_episode_description
    );

    // Evaluator load failures are retried with backoff inside; exhausting
    // the retries aborts the process here.
    let evaluator = model::load_evaluator(&config)?;

    let snapshot = selfplay::run(&config, evaluator)?;
    info!(
        episodes = snapshot.episodes,
        first_wins = snapshot.first_wins,
        second_wins = snapshot.second_wins,
        draws = snapshot.draws,
        avg_plies = snapshot.avg_plies,
        "self-play finished"
    );
    Ok(())
}
