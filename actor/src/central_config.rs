//! Centralized configuration loading from config.toml.
//!
//! Single source of truth for configuration values, loaded from config.toml
//! at the project root with support for `DESCENT_*` environment variable
//! overrides. CLI arguments take highest priority, followed by env vars,
//! then config.toml.

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

mod defaults {
    pub const DATA_DIR: &str = "./data";
    pub const LOG_LEVEL: &str = "info";
    pub const ACTOR_ID: &str = "actor-1";
    pub const NUM_WORKERS: usize = 4;
    pub const MAX_EPISODES: i32 = -1;
    pub const LOG_INTERVAL: u32 = 10;
    pub const SIMULATIONS_PER_MOVE: u32 = 50;
    pub const NOISE_STD: f32 = 0.2;
    pub const NOVELTY_WEIGHT: f32 = 0.8;
}

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub actor: ActorConfig,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    pub data_dir: String,
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::DATA_DIR.into(),
            log_level: defaults::LOG_LEVEL.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    pub actor_id: String,
    pub num_workers: usize,
    pub max_episodes: i32,
    pub log_interval: u32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            actor_id: defaults::ACTOR_ID.into(),
            num_workers: defaults::NUM_WORKERS,
            max_episodes: defaults::MAX_EPISODES,
            log_interval: defaults::LOG_INTERVAL,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub simulations_per_move: u32,
    pub noise_std: f32,
    pub novelty_weight: f32,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            simulations_per_move: defaults::SIMULATIONS_PER_MOVE,
            noise_std: defaults::NOISE_STD,
            novelty_weight: defaults::NOVELTY_WEIGHT,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the exported value network; `None` falls back to the uniform
    /// evaluator.
    pub path: Option<String>,
}

/// Standard locations to search for config.toml
const CONFIG_SEARCH_PATHS: &[&str] = &["config.toml", "../config.toml"];

/// Load the central configuration from config.toml.
pub fn load_config() -> CentralConfig {
    if let Ok(path) = std::env::var("DESCENT_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("loading config from DESCENT_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "DESCENT_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("loading config from {}", path.display());
            return load_from_path(&path);
        }
    }

    debug!("no config.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

fn load_from_path(path: &PathBuf) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (i32, u32, f32, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
    // Optional string field
    ($config:expr, $section:ident . $field:ident, $key:expr, optional) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = Some(v);
        }
    };
}

fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    env_override!(config, common.data_dir, "DESCENT_COMMON_DATA_DIR");
    env_override!(config, common.log_level, "DESCENT_COMMON_LOG_LEVEL");

    env_override!(config, actor.actor_id, "DESCENT_ACTOR_ACTOR_ID");
    env_override!(config, actor.num_workers, "DESCENT_ACTOR_NUM_WORKERS", parse);
    env_override!(
        config,
        actor.max_episodes,
        "DESCENT_ACTOR_MAX_EPISODES",
        parse
    );
    env_override!(
        config,
        actor.log_interval,
        "DESCENT_ACTOR_LOG_INTERVAL",
        parse
    );

    env_override!(
        config,
        search.simulations_per_move,
        "DESCENT_SEARCH_SIMULATIONS_PER_MOVE",
        parse
    );
    env_override!(config, search.noise_std, "DESCENT_SEARCH_NOISE_STD", parse);
    env_override!(
        config,
        search.novelty_weight,
        "DESCENT_SEARCH_NOVELTY_WEIGHT",
        parse
    );

    env_override!(config, model.path, "DESCENT_MODEL_PATH", optional);

    config
}
