//! Key-value persistence for the pending-queue snapshot.

use facemetry_core::StatusCategory;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Key under which the pending queue snapshot is stored.
pub const PENDING_KEY: &str = "queued-registrations";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot under {key:?} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn category(&self) -> StatusCategory {
        match self {
            PersistenceError::Corrupt { .. } => StatusCategory::Permanent,
            _ => StatusCategory::Transient,
        }
    }
}

/// Snapshot storage: whole values in, whole values out.
pub trait Persistence: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    /// Replace the value under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

impl<P: Persistence + ?Sized> Persistence for Box<P> {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Persistence for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// SQLite-backed store with a single `kv` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Persistence for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.conn().execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn Persistence) {
        assert_eq!(store.get(PENDING_KEY).unwrap(), None);
        store.set(PENDING_KEY, "[1]").unwrap();
        assert_eq!(store.get(PENDING_KEY).unwrap().as_deref(), Some("[1]"));
        store.set(PENDING_KEY, "[]").unwrap();
        assert_eq!(store.get(PENDING_KEY).unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn test_memory_store_overwrites() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_overwrites() {
        exercise(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_boxed_store_delegates() {
        let boxed: Box<dyn Persistence> = Box::new(MemoryStore::new());
        exercise(&boxed);
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("facemetry-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("queue.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.set(PENDING_KEY, "[\"x\"]").unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get(PENDING_KEY).unwrap().as_deref(), Some("[\"x\"]"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
