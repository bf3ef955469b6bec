//! SQLite-backed [`KvStore`].
//!
//! The [`SqliteStore`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation.  The connection is
//! kept behind a mutex so a single store can be shared between the snapshot
//! cache and the room directory.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::kv::KvStore;
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    max_value_bytes: Option<usize>,
}

impl SqliteStore {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/cloudchat/cloudchat.db`
    /// - macOS:   `~/Library/Application Support/com.cloudchat.cloudchat/cloudchat.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\cloudchat\cloudchat\data\cloudchat.db`
    pub fn open() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "cloudchat", "cloudchat").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Self::open_at(&data_dir.join("cloudchat.db"))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            max_value_bytes: None,
        })
    }

    /// Reject values larger than `max` bytes with [`StoreError::QuotaExceeded`].
    pub fn with_quota(mut self, max: usize) -> Self {
        self.max_value_bytes = Some(max);
        self
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(max) = self.max_value_bytes {
            if value.len() > max {
                return Err(StoreError::QuotaExceeded {
                    size: value.len(),
                    max,
                });
            }
        }

        self.conn()?.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()?
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_entries
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC",
        )?;

        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = SqliteStore::open_at(&path).expect("should open");
            assert_eq!(store.path(), Some(path.as_path()));
            store.set("roomList", r#"[{"id":1,"title":"a"}]"#).unwrap();
        }

        let reopened = SqliteStore::open_at(&path).unwrap();
        assert_eq!(
            reopened.get("roomList").unwrap().as_deref(),
            Some(r#"[{"id":1,"title":"a"}]"#)
        );
    }

    #[test]
    fn test_upsert_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));

        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_prefix_scan_ignores_like_wildcards() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("msg_cache_1", "a").unwrap();
        store.set("msg_cache_22", "b").unwrap();
        store.set("msgXcacheX3", "c").unwrap();
        store.set("roomList", "[]").unwrap();

        assert_eq!(
            store.keys_with_prefix("msg_cache_").unwrap(),
            vec!["msg_cache_1".to_string(), "msg_cache_22".to_string()]
        );
    }

    #[test]
    fn test_quota_rejects_large_values() {
        let store = SqliteStore::open_in_memory().unwrap().with_quota(8);
        assert!(matches!(
            store.set("k", "0123456789"),
            Err(StoreError::QuotaExceeded { size: 10, max: 8 })
        ));
        assert_eq!(store.get("k").unwrap(), None);
    }
}
