//! Store inspection and bulk removal.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::engine::{CacheEngine, total_bytes};
use crate::Error;

/// Snapshot of the store's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
    pub budget_bytes: u64,
    pub oldest_access: Option<DateTime<Utc>>,
    pub newest_access: Option<DateTime<Utc>>,
    /// `cache` rows with no `cache_size` row.
    pub orphan_entries: u64,
    /// `cache_size` rows with no `cache` row.
    pub orphan_sizes: u64,
}

impl CacheStats {
    /// Whether both tables hold exactly the same keys.
    pub fn is_consistent(&self) -> bool {
        self.orphan_entries == 0 && self.orphan_sizes == 0
    }
}

impl CacheEngine {
    /// Read entry counts, sizes and access range without modifying anything.
    pub fn stats(&self) -> Result<CacheStats, Error> {
        let budget_bytes = self.policy.budget_bytes();
        self.store.with_read_transaction(|tx| -> Result<CacheStats, Error> {
            let (entries, oldest, newest): (i64, Option<i64>, Option<i64>) =
                tx.query_row("SELECT COUNT(*), MIN(last_access), MAX(last_access) FROM cache", [], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
            let orphan_entries: i64 = tx.query_row(
                "SELECT COUNT(*) FROM cache WHERE NOT EXISTS (SELECT 1 FROM cache_size WHERE cache_size.key = cache.key)",
                [],
                |row| row.get(0),
            )?;
            let orphan_sizes: i64 = tx.query_row(
                "SELECT COUNT(*) FROM cache_size WHERE NOT EXISTS (SELECT 1 FROM cache WHERE cache.key = cache_size.key)",
                [],
                |row| row.get(0),
            )?;

            Ok(CacheStats {
                entries: entries as u64,
                total_bytes: total_bytes(tx)?,
                budget_bytes,
                oldest_access: oldest.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                newest_access: newest.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                orphan_entries: orphan_entries as u64,
                orphan_sizes: orphan_sizes as u64,
            })
        })
    }

    /// Delete every entry. Returns the number of entries removed.
    pub fn clear(&self) -> Result<u64, Error> {
        let removed = self.store.with_transaction(|tx| -> Result<usize, Error> {
            tx.execute("DELETE FROM cache_size", params![])?;
            Ok(tx.execute("DELETE FROM cache", params![])?)
        })?;

        tracing::info!(removed, path = %self.store.path().display(), "cleared cache store");
        Ok(removed as u64)
    }
}
