//! Self-play statistics tracking and persistence.
//!
//! Episode counts and outcomes, aggregated lock-free across the worker
//! threads and periodically written to a JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Aggregated self-play statistics, designed for lock-free updates.
#[derive(Debug)]
pub struct SelfplayStats {
    episodes: AtomicU32,
    first_wins: AtomicU32,
    second_wins: AtomicU32,
    draws: AtomicU32,
    total_plies: AtomicU64,
    start_time: Instant,
    stats_path: String,
}

/// Serializable stats for JSON output.
#[derive(Debug, Serialize, Deserialize)]
pub struct SelfplayStatsSnapshot {
    pub episodes: u32,
    pub first_wins: u32,
    pub second_wins: u32,
    pub draws: u32,
    pub first_win_rate: f64,
    pub avg_plies: f64,
    pub episodes_per_second: f64,
    pub runtime_seconds: f64,
}

impl SelfplayStats {
    pub fn new(data_dir: &str) -> Self {
        let stats_path = format!("{data_dir}/selfplay_stats.json");
        if let Err(e) = fs::create_dir_all(data_dir) {
            warn!("failed to create data directory: {e}");
        }
        Self {
            episodes: AtomicU32::new(0),
            first_wins: AtomicU32::new(0),
            second_wins: AtomicU32::new(0),
            draws: AtomicU32::new(0),
            total_plies: AtomicU64::new(0),
            start_time: Instant::now(),
            stats_path,
        }
    }

    /// Record a finished episode. `outcome_for_first` is +1/-1/0 from the
    /// first mover's perspective.
    pub fn record_episode(&self, plies: u32, outcome_for_first: f32) {
        self.episodes.fetch_add(1, Ordering::Relaxed);
        self.total_plies.fetch_add(plies as u64, Ordering::Relaxed);
        if outcome_for_first > 0.0 {
            self.first_wins.fetch_add(1, Ordering::Relaxed);
        } else if outcome_for_first < 0.0 {
            self.second_wins.fetch_add(1, Ordering::Relaxed);
        } else {
            self.draws.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SelfplayStatsSnapshot {
        let episodes = self.episodes.load(Ordering::Relaxed);
        let first_wins = self.first_wins.load(Ordering::Relaxed);
        let second_wins = self.second_wins.load(Ordering::Relaxed);
        let draws = self.draws.load(Ordering::Relaxed);
        let total_plies = self.total_plies.load(Ordering::Relaxed);
        let runtime = self.start_time.elapsed().as_secs_f64();

        let first_win_rate = if episodes > 0 {
            (first_wins as f64 + draws as f64 / 2.0) / episodes as f64
        } else {
            0.0
        };
        let avg_plies = if episodes > 0 {
            total_plies as f64 / episodes as f64
        } else {
            0.0
        };
        let episodes_per_second = if runtime > 0.0 {
            episodes as f64 / runtime
        } else {
            0.0
        };

        SelfplayStatsSnapshot {
            episodes,
            first_wins,
            second_wins,
            draws,
            first_win_rate,
            avg_plies,
            episodes_per_second,
            runtime_seconds: runtime,
        }
    }

    /// Write stats to the JSON file (write-then-rename, atomic on most
    /// filesystems).
    pub fn write_stats(&self) {
        let snapshot = self.snapshot();
        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!("failed to serialize selfplay stats: {e}");
                return;
            }
        };

        let temp_path = format!("{}.tmp", self.stats_path);
        match fs::File::create(&temp_path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(json.as_bytes()) {
                    warn!("failed to write selfplay stats: {e}");
                    return;
                }
            }
            Err(e) => {
                warn!("failed to create temp stats file: {e}");
                return;
            }
        }
        if let Err(e) = fs::rename(&temp_path, &self.stats_path) {
            warn!("failed to rename stats file: {e}");
            let _ = fs::remove_file(&temp_path);
            return;
        }
        debug!("wrote selfplay stats to {}", self.stats_path);
    }

    #[allow(dead_code)] // Used in tests
    pub fn stats_path(&self) -> &str {
        &self.stats_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn test_record_episode_categorizes_outcomes() {
        let dir = tempdir().unwrap();
        let stats = SelfplayStats::new(dir.path().to_str().unwrap());

        stats.record_episode(9, 1.0);
        stats.record_episode(7, -1.0);
        stats.record_episode(9, 0.0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.episodes, 3);
        assert_eq!(snapshot.first_wins, 1);
        assert_eq!(snapshot.second_wins, 1);
        assert_eq!(snapshot.draws, 1);
        assert!((snapshot.avg_plies - 25.0 / 3.0).abs() < 1e-9);
        assert!((snapshot.first_win_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_with_zero_episodes() {
        let dir = tempdir().unwrap();
        let stats = SelfplayStats::new(dir.path().to_str().unwrap());
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.episodes, 0);
        assert_eq!(snapshot.avg_plies, 0.0);
        assert!(!snapshot.first_win_rate.is_nan());
    }

    #[test]
    fn test_write_stats_roundtrip() {
        let dir = tempdir().unwrap();
        let stats = SelfplayStats::new(dir.path().to_str().unwrap());
        stats.record_episode(9, 1.0);
        stats.write_stats();

        let path = Path::new(stats.stats_path());
        assert!(path.exists());
        let content = fs::read_to_string(path).unwrap();
        let parsed: SelfplayStatsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.episodes, 1);
        assert_eq!(parsed.first_wins, 1);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempdir().unwrap();
        let stats = Arc::new(SelfplayStats::new(dir.path().to_str().unwrap()));

        let mut handles = vec![];
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.record_episode(5, 1.0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().episodes, 800);
    }
}
