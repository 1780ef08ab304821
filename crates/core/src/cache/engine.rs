//! Get-or-compute cache operations.
//!
//! Every public operation runs as a single IMMEDIATE transaction: the lookup
//! (or the caller's computation), the staleness sweep and the size trim either
//! all commit together or not at all.

use std::sync::Arc;

use rusqlite::{OptionalExtension, Transaction, params};

use super::clock::{Clock, SystemClock};
use super::connection::StoreHandle;
use super::eviction::{EvictionCandidate, EvictionPlan, EvictionPolicy};
use super::hash::{content_address, short};
use super::value::CacheValue;
use crate::Error;
use crate::config::{CacheConfig, ConfigError};

/// Persistent memoization cache.
pub struct CacheEngine {
    pub(crate) store: StoreHandle,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: EvictionPolicy,
    pub(crate) retention_secs: i64,
}

impl CacheEngine {
    /// Engine over the store described by `config`, using the wall clock.
    ///
    /// The store file is not opened until the first operation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `config` fails validation.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine reading timestamps from `clock` instead of the wall clock.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store: StoreHandle::from_config(config),
            clock,
            policy: EvictionPolicy::new(config.max_total_bytes),
            retention_secs: config.retention_secs(),
        })
    }

    /// The underlying store handle.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// `compute` runs at most once and only on a miss. If it fails, nothing
    /// is written and its error is returned unchanged. The transaction stays
    /// open while `compute` runs, so it must not call back into this engine.
    pub fn get<V, E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        V: CacheValue,
        F: FnOnce() -> Result<V, E>,
        E: From<Error>,
    {
        self.fetch(key, compute, false)
    }

    /// Store `value` under `key`, replacing any existing entry.
    pub fn put<V: CacheValue>(&self, key: &str, value: V) -> Result<(), Error> {
        self.fetch(key, || Ok::<V, Error>(value), true).map(drop)
    }

    /// Remove the entry for `key`.
    ///
    /// Returns whether an entry was present; a missing key is not an error.
    pub fn expire(&self, key: &str) -> Result<bool, Error> {
        let address = address_of(key)?;
        let removed = self.store.with_transaction(|tx| -> Result<bool, Error> {
            tx.execute("DELETE FROM cache_size WHERE key = ?1", params![address])?;
            let removed = tx.execute("DELETE FROM cache WHERE key = ?1", params![address])?;
            Ok(removed > 0)
        })?;

        tracing::debug!(address = short(&address), removed, "cache expire");
        Ok(removed)
    }

    fn fetch<V, E, F>(&self, key: &str, compute: F, force_miss: bool) -> Result<V, E>
    where
        V: CacheValue,
        F: FnOnce() -> Result<V, E>,
        E: From<Error>,
    {
        let address = address_of(key)?;

        self.store.with_transaction(|tx| -> Result<V, E> {
            let now = self.clock.now();
            let cached = if force_miss { None } else { lookup::<V>(tx, &address)? };

            let value = match cached {
                Some(value) => {
                    tx.execute("UPDATE cache SET last_access = ?1 WHERE key = ?2", params![now, address])
                        .map_err(Error::from)?;
                    tracing::debug!(address = short(&address), "cache hit");
                    value
                }
                None => {
                    let value = compute()?;
                    let blob = value.encode()?;
                    write_entry(tx, &address, &blob, now)?;
                    tracing::debug!(address = short(&address), size = blob.len(), force_miss, "cache write");
                    value
                }
            };

            self.sweep(tx, now)?;
            self.trim(tx)?;

            Ok(value)
        })
    }

    /// Drop entries idle past the retention window, then rows that lost
    /// their partner in the other table.
    pub(crate) fn sweep(&self, tx: &Transaction<'_>, now: i64) -> Result<(), Error> {
        let cutoff = now - self.retention_secs;
        let stale = tx.execute("DELETE FROM cache WHERE last_access < ?1", params![cutoff])?;
        let orphan_sizes = tx.execute(
            "DELETE FROM cache_size WHERE NOT EXISTS (SELECT 1 FROM cache WHERE cache.key = cache_size.key)",
            [],
        )?;
        let orphan_entries = tx.execute(
            "DELETE FROM cache WHERE NOT EXISTS (SELECT 1 FROM cache_size WHERE cache_size.key = cache.key)",
            [],
        )?;

        if stale > 0 {
            tracing::debug!(stale, cutoff, "swept stale cache entries");
        }
        if orphan_sizes > 0 || orphan_entries > 0 {
            tracing::warn!(orphan_sizes, orphan_entries, "pruned orphaned cache rows");
        }
        Ok(())
    }

    /// Evict least recently accessed entries while over budget.
    pub(crate) fn trim(&self, tx: &Transaction<'_>) -> Result<EvictionPlan, Error> {
        let total = total_bytes(tx)?;
        if !self.policy.needs_eviction(total) {
            return Ok(EvictionPlan { remaining_bytes: total, ..Default::default() });
        }

        let plan = {
            let mut stmt = tx.prepare(
                "SELECT c.key, s.size
                 FROM cache AS c JOIN cache_size AS s ON s.key = c.key
                 ORDER BY c.last_access ASC, c.key ASC",
            )?;
            let candidates = stmt.query_map([], |row| {
                Ok(EvictionCandidate { key: row.get(0)?, size: row.get::<_, i64>(1)?.max(0) as u64 })
            })?;
            self.policy.select(total, candidates)?
        };

        {
            let mut delete_size = tx.prepare_cached("DELETE FROM cache_size WHERE key = ?1")?;
            let mut delete_entry = tx.prepare_cached("DELETE FROM cache WHERE key = ?1")?;
            for key in &plan.condemned {
                delete_size.execute(params![key])?;
                delete_entry.execute(params![key])?;
            }
        }

        if plan.is_empty() {
            return Ok(plan);
        }
        tracing::debug!(
            evicted = plan.condemned.len(),
            freed_bytes = plan.freed_bytes,
            remaining_bytes = plan.remaining_bytes,
            budget_bytes = self.policy.budget_bytes(),
            "evicted cache entries over budget"
        );
        Ok(plan)
    }
}

fn address_of(key: &str) -> Result<String, Error> {
    if key.is_empty() {
        return Err(Error::InvalidInput("cache key must not be empty".into()));
    }
    Ok(content_address(key))
}

/// Fetch and decode the entry at `address`.
///
/// An entry missing its size row, or whose blob does not decode as `V`, is
/// reported as a miss so that the caller recomputes and overwrites it.
fn lookup<V: CacheValue>(tx: &Transaction<'_>, address: &str) -> Result<Option<V>, Error> {
    let blob: Option<Vec<u8>> = tx
        .query_row(
            "SELECT c.value FROM cache AS c JOIN cache_size AS s ON s.key = c.key WHERE c.key = ?1",
            params![address],
            |row| row.get(0),
        )
        .optional()?;

    let Some(blob) = blob else {
        tracing::debug!(address = short(address), "cache miss");
        return Ok(None);
    };

    match V::decode(blob) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(address = short(address), error = %e, "cached value failed to decode, recomputing");
            Ok(None)
        }
    }
}

fn write_entry(tx: &Transaction<'_>, address: &str, blob: &[u8], now: i64) -> Result<(), Error> {
    tx.execute(
        "INSERT INTO cache (key, value, last_access) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             last_access = excluded.last_access",
        params![address, blob, now],
    )?;
    tx.execute(
        "INSERT INTO cache_size (key, size) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET size = excluded.size",
        params![address, blob.len() as i64],
    )?;
    Ok(())
}

pub(crate) fn total_bytes(tx: &Transaction<'_>) -> Result<u64, Error> {
    let total: i64 = tx.query_row("SELECT COALESCE(SUM(size), 0) FROM cache_size", [], |row| row.get(0))?;
    Ok(total.max(0) as u64)
}
