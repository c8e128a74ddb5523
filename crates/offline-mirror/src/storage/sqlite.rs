//! SQLite key-value backend.
//!
//! All stores share one `kv` table keyed by `(database, store, key)`. Key
//! enumeration follows `rowid`, which an upsert keeps stable, so keys come
//! back in first-insertion order like `MemoryStore`.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};

use crate::error::{MirrorError, Result, StorageError};

use super::traits::{KeyValueStore, StoreHandle};

/// Map a rusqlite error to a `MirrorError`.
fn storage_err(e: rusqlite::Error) -> MirrorError {
    MirrorError::Storage(StorageError::Sqlite(e))
}

/// SQLite-backed `KeyValueStore`.
///
/// Statements are short and run while holding the connection lock; no await
/// happens under the lock.
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) a file-backed database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).map_err(storage_err)?;
        Self::init(conn)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(storage_err)?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;
             CREATE TABLE IF NOT EXISTS kv (
                 database TEXT NOT NULL,
                 store    TEXT NOT NULL,
                 key      TEXT NOT NULL,
                 value    TEXT NOT NULL,
                 PRIMARY KEY (database, store, key)
             );",
        )
        .map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str, store: &StoreHandle) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM kv WHERE database = ?1 AND store = ?2 AND key = ?3",
            params![store.database, store.store, key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(storage_err)
    }

    async fn set(&self, key: &str, value: &str, store: &StoreHandle) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (database, store, key, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (database, store, key) DO UPDATE SET value = excluded.value",
            params![store.database, store.store, key, value],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn del(&self, key: &str, store: &StoreHandle) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM kv WHERE database = ?1 AND store = ?2 AND key = ?3",
            params![store.database, store.store, key],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn keys(&self, store: &StoreHandle) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE database = ?1 AND store = ?2 ORDER BY rowid")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![store.database, store.store], |row| {
                row.get::<_, String>(0)
            })
            .map_err(storage_err)?;
        let keys = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(keys)
    }
}
