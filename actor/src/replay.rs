//! SQLite-based replay store for self-play training samples.
//!
//! Append-only per-episode rows of `(position_key, estimated_value)`; when an
//! episode ends the terminal outcome is back-filled across all of its rows,
//! alternating sign each step to reflect the alternating mover perspective.

use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;

/// One recorded sample, as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub step: u32,
    pub position_key: u64,
    pub value: f32,
    /// Final game outcome from this step's mover's perspective; `None` until
    /// the episode is finished.
    pub outcome: Option<f32>,
}

/// SQLite-backed replay store. One per self-play worker.
pub struct ReplayBuffer {
    conn: Connection,
}

impl ReplayBuffer {
    /// Open (creating if needed) the replay database.
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                position_key INTEGER NOT NULL,
                value REAL NOT NULL,
                outcome REAL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_samples_episode ON samples(episode_id)",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Append one `(position, value)` sample for an in-progress episode.
    pub fn record(
        &self,
        episode_id: &str,
        step: u32,
        position_key: u64,
        value: f32,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO samples (episode_id, step, position_key, value)
             VALUES (?1, ?2, ?3, ?4)",
            params![episode_id, step, position_key as i64, value],
        )?;
        Ok(())
    }

    /// Back-fill the episode's terminal outcome across every recorded step.
    ///
    /// `outcome_for_first` is from the perspective of the mover at the first
    /// recorded step; the sign alternates on each subsequent step. Returns
    /// the number of rows updated.
    pub fn finish_episode(&self, episode_id: &str, outcome_for_first: f32) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, step FROM samples WHERE episode_id = ?1 ORDER BY step")?;
        let rows: Vec<(i64, u32)> = stmt
            .query_map([episode_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut updated = 0;
        for (id, step) in rows {
            let sign = if step % 2 == 0 { 1.0 } else { -1.0 };
            self.conn.execute(
                "UPDATE samples SET outcome = ?1 WHERE id = ?2",
                params![outcome_for_first * sign, id],
            )?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Total number of stored samples.
    #[allow(dead_code)] // Used in tests
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All samples of one episode, ordered by step.
    #[allow(dead_code)] // Used in tests
    pub fn episode_samples(&self, episode_id: &str) -> Result<Vec<Sample>> {
        let mut stmt = self.conn.prepare(
            "SELECT step, position_key, value, outcome
             FROM samples WHERE episode_id = ?1 ORDER BY step",
        )?;
        let samples = stmt
            .query_map([episode_id], |row| {
                Ok(Sample {
                    step: row.get(0)?,
                    position_key: row.get::<_, i64>(1)? as u64,
                    value: row.get(2)?,
                    outcome: row.get::<_, Option<f64>>(3)?.map(|v| v as f32),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }
}
