//! Store connection management with pragma configuration.
//!
//! This module handles opening the SQLite store, applying pragmas for
//! concurrent access (WAL mode), and validating the schema fingerprint. A
//! store whose fingerprint does not match is wiped and rebuilt.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use super::schema::{self, SCHEMA};
use crate::Error;
use crate::config::CacheConfig;

/// Handle to the on-disk store.
///
/// The file is opened and validated lazily, once per handle; afterwards the
/// same connection is reused for every transaction. The connection sits
/// behind a mutex so a handle can be shared between threads.
#[derive(Debug)]
pub struct StoreHandle {
    path: PathBuf,
    busy_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl StoreHandle {
    /// Create a handle for the store at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self { path: path.into(), busy_timeout, conn: Mutex::new(None) }
    }

    /// Create a handle for the store and busy timeout named in `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.db_path.clone(), config.busy_timeout())
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open and validate the store now instead of on first use.
    pub fn connect(&self) -> Result<(), Error> {
        let mut slot = self.lock();
        self.ensure_open(&mut slot)?;
        Ok(())
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`; otherwise the transaction is rolled back
    /// and `f`'s error is returned as is. The write lock is held for the whole
    /// call, so other processes block (up to the busy timeout) meanwhile.
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<Error>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` inside a DEFERRED transaction for reads.
    ///
    /// No write lock is taken, so in WAL mode this proceeds while another
    /// process holds the store's write lock.
    pub fn with_read_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<Error>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    /// Close the connection, reporting any error SQLite raises while doing so.
    pub fn close(self) -> Result<(), Error> {
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| Error::from(e))?;
        }
        Ok(())
    }

    fn run<T, E, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<Error>,
    {
        let mut slot = self.lock();
        let conn = self.ensure_open(&mut slot)?;

        let tx = conn.transaction_with_behavior(behavior).map_err(Error::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(Error::from)?;

        Ok(value)
    }

    // A panic inside a transaction unwinds through `Transaction::drop`, which
    // rolls back, so the connection is still usable after poisoning.
    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open<'a>(&self, slot: &'a mut Option<Connection>) -> Result<&'a mut Connection, Error> {
        let conn = match slot.take() {
            Some(conn) => conn,
            None => open_validated(&self.path, self.busy_timeout)?,
        };
        Ok(slot.insert(conn))
    }
}

fn open_validated(path: &Path, busy_timeout: Duration) -> Result<Connection, Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    match open_checked(path, busy_timeout) {
        Err(Error::Database(e)) if e.sqlite_error_code() == Some(ErrorCode::NotADatabase) => {
            tracing::warn!(path = %path.display(), "store file is not a SQLite database, recreating");
            remove_store_files(path)?;
            open_checked(path, busy_timeout)
        }
        other => other,
    }
}

fn open_checked(path: &Path, busy_timeout: Duration) -> Result<Connection, Error> {
    let mut conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.execute_batch(
        "PRAGMA synchronous=NORMAL;
         PRAGMA temp_store=MEMORY;",
    )?;

    let expected = SCHEMA.fingerprint();
    if schema::stored_fingerprint(&conn)?.as_deref() != Some(expected.as_str()) {
        reset(&mut conn, path, &expected)?;
    } else {
        tracing::debug!(path = %path.display(), "cache store schema is current");
    }

    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Rebuild the store in place under the write lock.
///
/// The fingerprint is checked again once the lock is held: another process
/// may have finished the same reset while this one was waiting.
fn reset(conn: &mut Connection, path: &Path, expected: &str) -> Result<(), Error> {
    conn.pragma_update(None, "foreign_keys", "OFF")?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let found = schema::stored_fingerprint(&tx)?;
    if found.as_deref() != Some(expected) {
        tracing::info!(
            path = %path.display(),
            found = found.as_deref().unwrap_or("none"),
            expected,
            "resetting cache store to current schema"
        );
        schema::rebuild(&tx, &SCHEMA)?;
    }
    tx.commit()?;

    Ok(())
}

fn remove_store_files(path: &Path) -> Result<(), Error> {
    let sidecars = ["-wal", "-shm", "-journal"].map(|suffix| {
        let mut name = OsString::from(path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    });

    for file in std::iter::once(path.to_path_buf()).chain(sidecars) {
        match fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(file, e)),
        }
    }
    Ok(())
}
