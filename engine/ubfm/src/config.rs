//! Search configuration parameters.

/// Configuration for the plain best-first search (and the conspiracy-number
/// variant, which shares the budget and worker-pool settings).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Total simulation budget for one search, split evenly across workers.
    pub num_simulations: u32,

    /// Worker threads sharing the tree.
    pub num_threads: usize,

    /// Evaluator device passed through to `Evaluator::predict`.
    pub device_id: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_simulations: 2000,
            num_threads: 1,
            device_id: 0,
        }
    }
}

impl SearchConfig {
    /// Create a fast config for testing.
    pub fn for_testing() -> Self {
        Self {
            num_simulations: 100,
            num_threads: 1,
            device_id: 0,
        }
    }

    /// Builder pattern: set the total simulation budget.
    pub fn with_simulations(mut self, n: u32) -> Self {
        self.num_simulations = n;
        self
    }

    /// Builder pattern: set the worker thread count.
    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }
}

/// Configuration for the descent self-play search.
#[derive(Debug, Clone)]
pub struct DescentConfig {
    /// Baseline simulation budget per move. The stopping rules may cut this
    /// short or extend past it (see `DescentSearcher::should_stop`).
    pub num_simulations: u32,

    /// Standard deviation of the Gaussian noise added to child scores during
    /// selection, diversifying visited lines across episodes.
    pub noise_std: f32,

    /// Weight of the novelty bonus in final move choice:
    /// `novelty_weight / sqrt(1 + visits)`.
    pub novelty_weight: f32,

    /// Score magnitude past which a root child counts as practically decided
    /// for the early-stop heuristics.
    pub decided_threshold: f32,

    /// Evaluator device passed through to `Evaluator::predict`.
    pub device_id: usize,

    /// Seed for the selection noise; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for DescentConfig {
    fn default() -> Self {
        Self {
            num_simulations: 50,
            noise_std: 0.2,
            novelty_weight: 0.8,
            decided_threshold: 0.9,
            device_id: 0,
            seed: None,
        }
    }
}

impl DescentConfig {
    /// Create a deterministic config for testing.
    pub fn for_testing() -> Self {
        Self {
            num_simulations: 30,
            seed: Some(42),
            ..Self::default()
        }
    }

    /// Builder pattern: set the per-move simulation budget.
    pub fn with_simulations(mut self, n: u32) -> Self {
        self.num_simulations = n;
        self
    }

    /// Builder pattern: set the noise seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.num_simulations, 2000);
        assert_eq!(config.num_threads, 1);
    }

    #[test]
    fn test_builder_pattern() {
        let config = SearchConfig::default().with_simulations(500).with_threads(4);
        assert_eq!(config.num_simulations, 500);
        assert_eq!(config.num_threads, 4);
    }

    #[test]
    fn test_descent_defaults() {
        let config = DescentConfig::default();
        assert_eq!(config.num_simulations, 50);
        assert!((config.noise_std - 0.2).abs() < 1e-6);
        assert!((config.novelty_weight - 0.8).abs() < 1e-6);
        assert!(config.seed.is_none());
    }
}
