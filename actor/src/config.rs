//! Configuration for the self-play actor.
//!
//! Configuration is loaded from config.toml with environment variable
//! overrides; CLI arguments take highest priority.

use anyhow::{anyhow, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use tracing::level_filters::LevelFilter;

use crate::central_config::{load_config, CentralConfig};

// Load central config once at startup
static CENTRAL_CONFIG: Lazy<CentralConfig> = Lazy::new(load_config);

fn default_actor_id() -> String {
    CENTRAL_CONFIG.actor.actor_id.clone()
}

fn default_num_workers() -> usize {
    CENTRAL_CONFIG.actor.num_workers
}

fn default_max_episodes() -> i32 {
    CENTRAL_CONFIG.actor.max_episodes
}

fn default_log_interval() -> u32 {
    CENTRAL_CONFIG.actor.log_interval
}

fn default_log_level() -> String {
    CENTRAL_CONFIG.common.log_level.clone()
}

fn default_data_dir() -> String {
    CENTRAL_CONFIG.common.data_dir.clone()
}

fn default_simulations() -> u32 {
    CENTRAL_CONFIG.search.simulations_per_move
}

fn default_noise_std() -> f32 {
    CENTRAL_CONFIG.search.noise_std
}

fn default_novelty_weight() -> f32 {
    CENTRAL_CONFIG.search.novelty_weight
}

fn default_model_path() -> Option<String> {
    CENTRAL_CONFIG.model.path.clone()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "actor")]
#[command(about = "Descent actor - self-play episode runner")]
#[command(
    long_about = "Runs descent self-play episodes with a shared value network,
recording (position, value) training samples to the replay store and keeping
the per-position novelty counters up to date.

Configuration is loaded from config.toml with DESCENT_* environment variable
overrides. CLI arguments take highest priority."
)]
pub struct Config {
    /// Unique actor identifier, used in episode ids
    #[arg(long, default_value_t = default_actor_id())]
    pub actor_id: String,

    /// Number of self-play worker threads, each with its own tree and stores
    #[arg(long, default_value_t = default_num_workers())]
    pub num_workers: usize,

    /// Total episodes to play across all workers (-1 for unlimited)
    #[arg(long, default_value_t = default_max_episodes())]
    pub max_episodes: i32,

    /// Log progress every N episodes (0 to disable)
    #[arg(long, default_value_t = default_log_interval())]
    pub log_interval: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,

    /// Data directory for replay stores, novelty counters, and stats
    #[arg(long, default_value_t = default_data_dir())]
    pub data_dir: String,

    /// Baseline simulation budget per self-play move
    #[arg(long, default_value_t = default_simulations())]
    pub simulations_per_move: u32,

    /// Standard deviation of the selection noise
    #[arg(long, default_value_t = default_noise_std())]
    pub noise_std: f32,

    /// Weight of the novelty bonus in move choice
    #[arg(long, default_value_t = default_novelty_weight())]
    pub novelty_weight: f32,

    /// Path to the value network; omitted means the uniform evaluator
    #[arg(long)]
    pub model_path: Option<String>,

    /// Seed for the selection noise (worker id is added per worker)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.actor_id.is_empty() {
            return Err(anyhow!("actor_id cannot be empty"));
        }
        if self.num_workers == 0 {
            return Err(anyhow!("num_workers must be greater than 0"));
        }
        if self.simulations_per_move == 0 {
            return Err(anyhow!("simulations_per_move must be greater than 0"));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(anyhow!("noise_std must be a non-negative number"));
        }
        if !self.novelty_weight.is_finite() || self.novelty_weight < 0.0 {
            return Err(anyhow!("novelty_weight must be a non-negative number"));
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }
        Ok(())
    }

    /// Resolved model path, with the config.toml fallback applied.
    pub fn model_path(&self) -> Option<String> {
        self.model_path.clone().or_else(default_model_path)
    }

    /// Per-worker replay database path.
    pub fn replay_db_path(&self, worker_id: usize) -> String {
        format!("{}/replay-w{}.db", self.data_dir, worker_id)
    }

    /// Per-worker novelty counter database path.
    pub fn novelty_db_path(&self, worker_id: usize) -> String {
        format!("{}/novelty-w{}.db", self.data_dir, worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            actor_id: "actor".into(),
            num_workers: 1,
            max_episodes: 1,
            log_interval: 10,
            log_level: "info".into(),
            data_dir: "./data".into(),
            simulations_per_move: 30,
            noise_std: 0.2,
            novelty_weight: 0.8,
            model_path: None,
            seed: Some(42),
        }
    }

    #[test]
    fn validate_accepts_valid_configuration() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_actor_id() {
        let mut cfg = base_config();
        cfg.actor_id.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("actor_id"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut cfg = base_config();
        cfg.num_workers = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("num_workers"));
    }

    #[test]
    fn validate_rejects_zero_simulations() {
        let mut cfg = base_config();
        cfg.simulations_per_move = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("simulations_per_move"));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "nope".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }

    #[test]
    fn validate_accepts_negative_max_episodes() {
        let mut cfg = base_config();
        cfg.max_episodes = -1; // Unlimited mode
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn per_worker_paths_are_distinct() {
        let cfg = base_config();
        assert_ne!(cfg.replay_db_path(0), cfg.replay_db_path(1));
        assert_ne!(cfg.novelty_db_path(0), cfg.replay_db_path(0));
    }
}
