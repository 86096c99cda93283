//! SQLite backend.
//!
//! All collections share one `kv` table keyed by `(collection, key)`, so a
//! single file holds the whole plugin state.

use crate::backend::{Collection, StorageBackend};
use crate::error::StoreResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Persistent backend backed by SQLite.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a database at the given path, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened plugin store");
        Self::with_connection(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn();
        // In-memory databases answer "memory" and keep their journal mode.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            );
            ",
        )?;
        debug!(journal_mode = %mode, "Plugin store schema ready");
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM kv WHERE collection = ?1 AND key = ?2",
                params![collection.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, collection: Collection, key: &str, value: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (collection, key, value) VALUES (?1, ?2, ?3)",
            params![collection.as_str(), key, value],
        )?;
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM kv WHERE collection = ?1 AND key = ?2",
            params![collection.as_str(), key],
        )?;
        Ok(removed > 0)
    }

    fn delete_if(&self, collection: Collection, key: &str, expected: &str) -> StoreResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM kv WHERE collection = ?1 AND key = ?2 AND value = ?3",
            params![collection.as_str(), key, expected],
        )?;
        Ok(removed > 0)
    }

    fn list(&self, collection: Collection) -> StoreResult<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT key, value FROM kv WHERE collection = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![collection.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn clear(&self, collection: Collection) -> StoreResult<usize> {
        let removed = self.conn().execute(
            "DELETE FROM kv WHERE collection = ?1",
            params![collection.as_str()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(Collection::Settings, "ext", "{}").unwrap();
        assert_eq!(
            backend.get(Collection::Settings, "ext").unwrap().as_deref(),
            Some("{}")
        );
        assert!(backend.delete(Collection::Settings, "ext").unwrap());
        assert_eq!(backend.get(Collection::Settings, "ext").unwrap(), None);
    }

    #[test]
    fn delete_if_leaves_replaced_value() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(Collection::Cache, "k", "stale").unwrap();
        backend.put(Collection::Cache, "k", "fresh").unwrap();
        assert!(!backend.delete_if(Collection::Cache, "k", "stale").unwrap());
        assert_eq!(
            backend.get(Collection::Cache, "k").unwrap().as_deref(),
            Some("fresh")
        );
        assert!(backend.delete_if(Collection::Cache, "k", "fresh").unwrap());
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(&dir.path().join("wal.db")).unwrap();
        let mode: String = backend
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn same_key_in_two_collections() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(Collection::Settings, "k", "a").unwrap();
        backend.put(Collection::Secrets, "k", "b").unwrap();
        assert_eq!(backend.list(Collection::Settings).unwrap().len(), 1);
        assert_eq!(backend.list(Collection::Secrets).unwrap().len(), 1);
    }

    #[test]
    fn insert_or_replace_keeps_one_row() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(Collection::Cache, "k", "1").unwrap();
        backend.put(Collection::Cache, "k", "2").unwrap();
        let rows = backend.list(Collection::Cache).unwrap();
        assert_eq!(rows, vec![("k".to_string(), "2".to_string())]);
    }

    #[test]
    fn clear_counts_rows() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(Collection::Cache, "a", "1").unwrap();
        backend.put(Collection::Cache, "b", "1").unwrap();
        backend.put(Collection::Meta, "a", "1").unwrap();
        assert_eq!(backend.clear(Collection::Cache).unwrap(), 2);
        assert_eq!(backend.list(Collection::Meta).unwrap().len(), 1);
    }

    #[test]
    fn reopening_a_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("plugins.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.put(Collection::Meta, "loaded-set", "[\"a\"]").unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(Collection::Meta, "loaded-set").unwrap().as_deref(),
            Some("[\"a\"]")
        );
    }
}
