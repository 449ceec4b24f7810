//! Run snapshot storage on redb.
//!
//! # Table design
//!
//! A single `RUNS` table uses a 24-byte composite key:
//! ```text
//! [ started_at_ms: u64 big-endian (8 bytes) | run uuid: 16 bytes ]
//! ```
//!
//! Big-endian timestamps in the high bytes make key order equal start order,
//! so a range scan from a lower bound yields every run started since then.
//! Saving the same run again overwrites its snapshot in place.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::aggregate::ExecutionResult;
use crate::error::{BrigadeError, Result};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: 24-byte composite (started_at_ms big-endian ++ uuid bytes)
/// Value: JSON-encoded ExecutionResult
const RUNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("runs");

fn store_err(e: impl std::fmt::Display) -> BrigadeError {
    BrigadeError::RunStore(e.to_string())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn run_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

/// Lower bound for a scan of runs started at or after `since`.
fn since_lower_bound(since: DateTime<Utc>) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = since.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key
}

// ---------------------------------------------------------------------------
// RunDb
// ---------------------------------------------------------------------------

pub struct RunDb {
    db: Database,
}

impl RunDb {
    /// Open or create the database at `path`, creating the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(RUNS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Insert or overwrite the snapshot of `result`.
    pub fn save(&self, result: &ExecutionResult) -> Result<()> {
        let key = run_key(result.started_at, result.run_id);
        let value = serde_json::to_vec(result).map_err(store_err)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(RUNS).map_err(store_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    pub fn get(&self, run_id: Uuid) -> Result<ExecutionResult> {
        self.list_all()?
            .into_iter()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| BrigadeError::RunNotFound(run_id.to_string()))
    }

    /// Runs started at or after `since`, oldest first.
    pub fn range_since(&self, since: DateTime<Utc>) -> Result<Vec<ExecutionResult>> {
        let lower = since_lower_bound(since);
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(RUNS).map_err(store_err)?;
        let mut runs = Vec::new();
        for entry in table.range(lower.as_slice()..).map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            runs.push(serde_json::from_slice(v.value()).map_err(store_err)?);
        }
        Ok(runs)
    }

    /// All runs, newest first.
    pub fn list_all(&self) -> Result<Vec<ExecutionResult>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(RUNS).map_err(store_err)?;
        let mut runs: Vec<ExecutionResult> = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            runs.push(serde_json::from_slice(v.value()).map_err(store_err)?);
        }
        runs.reverse();
        Ok(runs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
