//! Process-crossing key-value storage shared by the app and the widget.
//!
//! Last writer wins per key; there is no locking or multi-key atomicity.
//! Every write is durable and visible to the other process's next read.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use goatjp_core::StorageError;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};

/// How long a writer waits on the other process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Byte-blob store addressed by string keys within one namespace.
pub trait PersistentStore: Send + Sync {
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// `Ok(None)` when the key was never set or has been removed.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process store, used in tests and when no shared location is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PersistentStore for MemoryStore {
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// SQLite-backed store on a file both processes can open.
///
/// Each process holds its own connection; WAL journaling lets the widget read
/// while the app writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    namespace: String,
}

impl SqliteStore {
    /// Open (or create) the shared database at `path`, scoped to `namespace`.
    pub fn open<P: AsRef<Path>>(path: P, namespace: &str) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Open(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| StorageError::Open(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StorageError::Open(e.to_string()))?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| StorageError::Open(e.to_string()))?;
        tracing::debug!("Shared store {:?} opened in {} mode", path, mode);

        let store = Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    #[cfg(test)]
    pub fn in_memory(namespace: &str) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS shared_kv (
                    namespace TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value BLOB NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (namespace, key)
                );
                "#,
            )
            .map_err(|e| StorageError::Open(e.to_string()))
    }
}

impl PersistentStore for SqliteStore {
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO shared_kv (namespace, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![self.namespace, key, value, Utc::now().timestamp_millis()],
            )
            .map_err(|e| StorageError::Write(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM shared_kv WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::Read(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM shared_kv WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, key],
            )
            .map_err(|e| StorageError::Write(e.to_string()))?;
        Ok(())
    }
}
