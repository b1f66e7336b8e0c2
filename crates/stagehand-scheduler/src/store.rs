use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use stagehand_core::config::StoreConfig;
use tracing::{debug, info};

use crate::{db::init_db, error::Result};

/// Callback run inside a store transaction. Receives the current bytes (if
/// any) and returns the bytes to write back, or `None` to leave them as-is.
pub type TransactFn<'a> = dyn FnMut(Option<&[u8]>) -> Result<Option<Vec<u8>>> + 'a;

/// Shared byte storage for schedule snapshots.
///
/// `transact` is the atomic load + save pair: no other `transact` on the same
/// key may interleave between the read handed to the callback and the write
/// of its result. An error from the callback aborts without writing.
pub trait ScheduleStore: Send + Sync {
    /// Read the current bytes without taking part in a transaction.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn transact(&self, key: &str, f: &mut TransactFn<'_>) -> Result<()>;

    /// Delete the snapshot. Returns whether one existed.
    fn remove(&self, key: &str) -> Result<bool>;
}

/// In-process store for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn transact(&self, key: &str, f: &mut TransactFn<'_>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let next = f(entries.get(key).map(Vec::as_slice))?;
        if let Some(next) = next {
            entries.insert(key.to_string(), next);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }
}

/// SQLite-backed store shared by worker processes on one host (or one
/// network filesystem with working locks).
///
/// Each `transact` runs in a `BEGIN IMMEDIATE` transaction, which takes the
/// database write lock up front. A second process blocks (up to the busy
/// timeout) until the first commits, so snapshots are never transformed
/// concurrently.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (or create) the database named by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        ensure_parent_dir(&config.path)?;
        info!(path = %config.path, "opening schedule store");
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }
}

impl ScheduleStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let body = conn
            .query_row("SELECT body FROM schedules WHERE key = ?1", [key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(body)
    }

    fn transact(&self, key: &str, f: &mut TransactFn<'_>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = tx
            .query_row("SELECT body FROM schedules WHERE key = ?1", [key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;

        // Dropping `tx` on an early return rolls back.
        if let Some(next) = f(current.as_deref())? {
            tx.execute(
                "INSERT INTO schedules (key, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET body = excluded.body,
                                                updated_at = excluded.updated_at",
                rusqlite::params![key, next, Utc::now().to_rfc3339()],
            )?;
            debug!(%key, bytes = next.len(), "schedule saved");
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM schedules WHERE key = ?1", [key])?;
        Ok(n > 0)
    }
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::SchedulerError::Storage(e.to_string()))?;
        }
    }
    Ok(())
}
