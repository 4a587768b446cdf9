//! Self-play episode loop.
//!
//! Each worker thread owns a descent searcher, a replay store, and a novelty
//! counter store. Per move it rebuilds the search tree, records the
//! `(position, value)` training sample, bumps the novelty counter for the
//! position the move was chosen from, and plays the chosen move; at the end
//! of an episode the terminal outcome is back-filled across the recorded
//! samples.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info};

use engine_core::{GameState, Player};
use games_tictactoe::Position;
use ubfm::{DescentConfig, DescentSearcher, Evaluator};

use crate::config::Config;
use crate::novelty::NoveltyStore;
use crate::replay::ReplayBuffer;
use crate::stats::{SelfplayStats, SelfplayStatsSnapshot};

/// Run the configured number of self-play episodes across the worker pool
/// and return the final statistics snapshot.
pub fn run(
    config: &Config,
    evaluator: Arc<dyn Evaluator<Position>>,
) -> Result<SelfplayStatsSnapshot> {
    let stats = Arc::new(SelfplayStats::new(&config.data_dir));
    let episodes = Arc::new(AtomicI64::new(0));

    thread::scope(|scope| {
        let handles: Vec<_> = (0..config.num_workers)
            .map(|worker_id| {
                let evaluator = Arc::clone(&evaluator);
                let stats = Arc::clone(&stats);
                let episodes = Arc::clone(&episodes);
                scope.spawn(move || {
                    let mut worker =
                        SelfplayWorker::new(config, worker_id, evaluator, stats, episodes)?;
                    worker.run()
                })
            })
            .collect();
        let mut result = Ok(());
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(_) => {
                    if result.is_ok() {
                        result = Err(anyhow::anyhow!("a self-play worker panicked"));
                    }
                }
            }
        }
        result
    })?;

    stats.write_stats();
    Ok(stats.snapshot())
}

struct SelfplayWorker {
    worker_id: usize,
    actor_id: String,
    searcher: DescentSearcher<Position>,
    replay: ReplayBuffer,
    novelty: NoveltyStore,
    stats: Arc<SelfplayStats>,
    episodes: Arc<AtomicI64>,
    max_episodes: i64,
    log_interval: u32,
}

impl SelfplayWorker {
    fn new(
        config: &Config,
        worker_id: usize,
        evaluator: Arc<dyn Evaluator<Position>>,
        stats: Arc<SelfplayStats>,
        episodes: Arc<AtomicI64>,
    ) -> Result<Self> {
        let descent_config = DescentConfig {
            num_simulations: config.simulations_per_move,
            noise_std: config.noise_std,
            novelty_weight: config.novelty_weight,
            seed: config.seed.map(|s| s + worker_id as u64),
            ..DescentConfig::default()
        };
        let searcher = DescentSearcher::new(evaluator, descent_config)
            .context("failed to build the descent searcher")?;
        let replay = ReplayBuffer::new(&config.replay_db_path(worker_id))
            .context("failed to open the replay store")?;
        let novelty = NoveltyStore::new(&config.novelty_db_path(worker_id))
            .context("failed to open the novelty store")?;
        Ok(Self {
            worker_id,
            actor_id: config.actor_id.clone(),
            searcher,
            replay,
            novelty,
            stats,
            episodes,
            max_episodes: config.max_episodes as i64,
            log_interval: config.log_interval,
        })
    }

    fn run(&mut self) -> Result<()> {
        info!(worker_id = self.worker_id, "self-play worker started");
        loop {
            let index = self.episodes.fetch_add(1, Ordering::SeqCst);
            if self.max_episodes >= 0 && index >= self.max_episodes {
                break;
            }
            self.play_episode(index)?;
            self.novelty.compact()?;

            let played = index + 1;
            if self.log_interval > 0 && played % self.log_interval as i64 == 0 {
                self.stats.write_stats();
                let snapshot = self.stats.snapshot();
                info!(
                    episodes = snapshot.episodes,
                    first_win_rate = snapshot.first_win_rate,
                    avg_plies = snapshot.avg_plies,
                    "self-play progress"
                );
            }
        }
        info!(worker_id = self.worker_id, "self-play worker finished");
        Ok(())
    }

    fn play_episode(&mut self, index: i64) -> Result<()> {
        let episode_id = format!("{}-w{}-{}", self.actor_id, self.worker_id, index);
        let mut position = Position::new();
        let mut step = 0u32;

        loop {
            if position.is_done() {
                let outcome = outcome_for_first_mover(&position);
                self.replay.finish_episode(&episode_id, outcome)?;
                self.stats.record_episode(step, outcome);
                debug!(%episode_id, plies = step, outcome, "episode finished");
                return Ok(());
            }

            let report = self.searcher.think(position.clone(), &self.novelty)?;
            let key = position.canonical_key();
            self.replay.record(&episode_id, step, key, report.value)?;
            self.novelty.increment(key)?;

            position = position.apply(report.best_move);
            step += 1;
        }
    }
}

/// Terminal outcome from the first mover's perspective: the side to move at a
/// lost terminal position is the loser.
fn outcome_for_first_mover(position: &Position) -> f32 {
    if position.is_draw() {
        0.0
    } else if position.turn() == Player::First {
        -1.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use ubfm::UniformEvaluator;

    fn test_config(dir: &tempfile::TempDir, episodes: i32, workers: usize) -> Config {
        Config {
            actor_id: "test".into(),
            num_workers: workers,
            max_episodes: episodes,
            log_interval: 0,
            log_level: "info".into(),
            data_dir: dir.path().to_str().unwrap().to_string(),
            simulations_per_move: 20,
            noise_std: 0.2,
            novelty_weight: 0.8,
            model_path: None,
            seed: Some(42),
        }
    }

    #[test]
    fn test_outcome_for_first_mover() {
        // First mover loses: o o x / x x - / o o? Use a line for x with o to
        // move: after 0,3,1,4,8,5 the x pieces 3,4,5 complete a row.
        let lost = [0u8, 3, 1, 4, 8, 5].iter().fold(Position::new(), |p, &sq| {
            p.apply(games_tictactoe::Move(sq))
        });
        assert!(lost.is_lose());
        assert_eq!(outcome_for_first_mover(&lost), -1.0);

        let drawn = [0u8, 1, 2, 4, 3, 5, 7, 6, 8]
            .iter()
            .fold(Position::new(), |p, &sq| p.apply(games_tictactoe::Move(sq)));
        assert!(drawn.is_draw());
        assert_eq!(outcome_for_first_mover(&drawn), 0.0);
    }

    #[test]
    fn test_single_worker_episodes() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, 2, 1);
        let evaluator: Arc<dyn Evaluator<Position>> = Arc::new(UniformEvaluator::new());

        let snapshot = run(&config, evaluator).unwrap();
        assert_eq!(snapshot.episodes, 2);
        // Tic-tac-toe episodes run 5 to 9 plies.
        assert!(snapshot.avg_plies >= 5.0 && snapshot.avg_plies <= 9.0);

        // Every recorded sample got its outcome back-filled.
        let replay = ReplayBuffer::new(&config.replay_db_path(0)).unwrap();
        assert!(replay.count().unwrap() >= 10);
        for episode in 0..2 {
            let episode_id = format!("test-w0-{episode}");
            let samples = replay.episode_samples(&episode_id).unwrap();
            assert!(!samples.is_empty());
            for sample in &samples {
                assert!(sample.outcome.is_some());
                assert!(sample.value.abs() <= 1.0);
            }
        }

        // The novelty store saw every visited position at least once.
        let novelty = NoveltyStore::new(&config.novelty_db_path(0)).unwrap();
        assert!(novelty.len().unwrap() >= 5);
        assert!(novelty.get(Position::new().canonical_key()).unwrap() >= 2);
    }

    #[test]
    fn test_multi_worker_episode_budget_is_shared() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, 4, 2);
        let evaluator: Arc<dyn Evaluator<Position>> = Arc::new(UniformEvaluator::new());

        let snapshot = run(&config, evaluator).unwrap();
        assert_eq!(snapshot.episodes, 4);
        assert_eq!(
            snapshot.first_wins + snapshot.second_wins + snapshot.draws,
            4
        );
    }
}
