//! Persistent per-position visit counters for the self-play novelty bonus.
//!
//! A plain `position_key -> count` map in SQLite. A missing backing file is
//! not an error: the store starts empty. Once the map grows past a bound it
//! is compacted by repeatedly dropping entries below a rising count
//! threshold until it fits again, keeping only the positions seen often.

use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, warn};

use ubfm::VisitCounter;

/// Compaction kicks in once the store holds more entries than this.
pub const MAX_ENTRIES: usize = 1_000_000;

/// SQLite-backed novelty counter store. One per self-play worker.
pub struct NoveltyStore {
    conn: Connection,
}

impl NoveltyStore {
    /// Open (creating if needed) the counter database. A missing file simply
    /// yields an empty store.
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS visits (
                key INTEGER PRIMARY KEY,
                count INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Bump the visit count for a position.
    pub fn increment(&self, key: u64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO visits (key, count) VALUES (?1, 1)
             ON CONFLICT(key) DO UPDATE SET count = count + 1",
            params![key as i64],
        )?;
        Ok(())
    }

    /// Visit count for a position, 0 if never seen.
    pub fn get(&self, key: u64) -> Result<u64> {
        let count: Option<i64> = self
            .conn
            .query_row(
                "SELECT count FROM visits WHERE key = ?1",
                params![key as i64],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(count.unwrap_or(0) as u64)
    }

    /// Number of distinct positions tracked.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Compact down to [`MAX_ENTRIES`] if the store has outgrown it.
    pub fn compact(&self) -> Result<usize> {
        self.compact_to(MAX_ENTRIES)
    }

    /// Drop entries below a rising count threshold until at most
    /// `max_entries` remain. Returns the number of entries removed.
    pub fn compact_to(&self, max_entries: usize) -> Result<usize> {
        let mut removed = 0;
        let mut threshold: i64 = 1;
        while self.len()? > max_entries {
            removed += self
                .conn
                .execute("DELETE FROM visits WHERE count < ?1", params![threshold])?;
            threshold += 1;
        }
        if removed > 0 {
            debug!(removed, "compacted novelty store");
        }
        Ok(removed)
    }
}

impl VisitCounter for NoveltyStore {
    fn count(&self, key: u64) -> u64 {
        // A store error must not abort the search; an unknown position just
        // gets the full novelty bonus.
        self.get(key).unwrap_or_else(|e| {
            warn!("novelty counter read failed: {e}");
            0
        })
    }
}
