//! SQLite persistence for resolved station pairs.
//!
//! Directions queries cost money and quota, so every resolved pair is stored
//! and loaded back into the in-memory [`PairCache`] before the next build.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::discovery::{CachedPair, PairCache, PairOutcome};
use crate::error::Result;
use crate::station::{PairKey, StationId};

const OUTCOME_ROUTE: &str = "route";
const OUTCOME_NO_ROUTE: &str = "no_route";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM pair_outcomes";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS pair_outcomes (
    station_a INTEGER NOT NULL,
    station_b INTEGER NOT NULL,
    outcome TEXT NOT NULL,
    distance_km REAL,
    duration_s REAL,
    session_token TEXT,
    resolved_at TEXT NOT NULL,
    PRIMARY KEY (station_a, station_b)
)";

/// On-disk store of directions outcomes keyed by canonical station pair.
#[derive(Debug)]
pub struct LegCache {
    connection: Connection,
}

struct StoredRow {
    a: StationId,
    b: StationId,
    outcome: String,
    distance_km: Option<f64>,
    duration_s: Option<f64>,
    session_token: Option<String>,
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        a: row.get(0)?,
        b: row.get(1)?,
        outcome: row.get(2)?,
        distance_km: row.get(3)?,
        duration_s: row.get(4)?,
        session_token: row.get(5)?,
    })
}

impl LegCache {
    /// Open (creating if needed) the cache file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(path)?;
        connection.execute(SCHEMA, [])?;
        debug!(path = %path.display(), "opened leg cache");
        Ok(Self { connection })
    }

    /// In-memory cache, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute(SCHEMA, [])?;
        Ok(Self { connection })
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self.connection.query_row(COUNT_SQL, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy every stored outcome into `cache`, keeping entries already
    /// present. Returns how many entries were added.
    pub fn load_into(&self, cache: &PairCache) -> Result<usize> {
        let mut stmt = self.connection.prepare(
            "SELECT station_a, station_b, outcome, distance_km, duration_s, session_token
             FROM pair_outcomes ORDER BY station_a, station_b",
        )?;
        let rows = stmt.query_map([], row_to_stored)?;

        let mut loaded = 0;
        for row in rows {
            let row = row?;
            let outcome = match (row.outcome.as_str(), row.distance_km, row.duration_s) {
                (OUTCOME_ROUTE, Some(distance_km), Some(duration_s)) => PairOutcome::Route {
                    distance_km,
                    duration_s,
                },
                (OUTCOME_NO_ROUTE, _, _) => PairOutcome::NoRoute,
                (other, _, _) => {
                    warn!(
                        a = row.a,
                        b = row.b,
                        outcome = other,
                        "ignoring unreadable cached pair"
                    );
                    continue;
                }
            };
            let session_token = row.session_token.and_then(|t| Uuid::parse_str(&t).ok());
            if cache.insert_if_absent(
                PairKey::new(row.a, row.b),
                CachedPair {
                    outcome,
                    session_token,
                },
            ) {
                loaded += 1;
            }
        }

        info!(loaded, "loaded cached station pairs");
        Ok(loaded)
    }

    /// Persist every entry of `cache` not yet stored. Returns how many rows
    /// were written.
    pub fn store(&mut self, cache: &PairCache) -> Result<usize> {
        let resolved_at = Utc::now().to_rfc3339();
        let tx = self.connection.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pair_outcomes
                 (station_a, station_b, outcome, distance_km, duration_s, session_token, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (key, entry) in cache.entries() {
                let (outcome, distance_km, duration_s) = match entry.outcome {
                    PairOutcome::Route {
                        distance_km,
                        duration_s,
                    } => (OUTCOME_ROUTE, Some(distance_km), Some(duration_s)),
                    PairOutcome::NoRoute => (OUTCOME_NO_ROUTE, None, None),
                };
                written += stmt.execute(params![
                    key.low(),
                    key.high(),
                    outcome,
                    distance_km,
                    duration_s,
                    entry.session_token.map(|t| t.to_string()),
                    resolved_at,
                ])?;
            }
        }
        tx.commit()?;
        info!(written, "stored station pairs");
        Ok(written)
    }
}
