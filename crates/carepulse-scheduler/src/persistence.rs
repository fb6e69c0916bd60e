//! SQLite-backed key-value store — survives restarts, one row per key.

use std::path::Path;
use std::sync::Mutex;

use carepulse_core::error::{CarePulseError, Result};
use carepulse_core::traits::KvStore;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

/// SQLite persistence for entity collections and reminder markers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| CarePulseError::Store(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| CarePulseError::Store(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| CarePulseError::Store(format!("Migration: {e}")))
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(|e| CarePulseError::Store(format!("Get '{key}': {e}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(|e| CarePulseError::Store(format!("Set '{key}': {e}")))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(|e| CarePulseError::Store(format!("Remove '{key}': {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("carepulse.db")).unwrap();
        assert_eq!(store.get("appointments").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("tasks", "[]").unwrap();
        store.set("tasks", r#"[{"id":"1"}]"#).unwrap();
        assert_eq!(store.get("tasks").unwrap().as_deref(), Some(r#"[{"id":"1"}]"#));
        store.remove("tasks").unwrap();
        assert_eq!(store.get("tasks").unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carepulse.db");
        SqliteStore::open(&path).unwrap().set("notified-med-1-x", "true").unwrap();
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("notified-med-1-x").unwrap().as_deref(), Some("true"));
    }
}
