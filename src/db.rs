//! Local SQLite key/value store.
//!
//! Holds the small amount of state the console keeps between runs: the
//! theme preference, the assistant chat cache and, when the OS credential
//! store is disabled, the persisted session. Everything lives in a single
//! `local_settings` table keyed by `(category, key)`.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::StoreError;

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Local store handle. Connection access is serialized through a mutex;
/// the guard is never held across an `.await`.
pub struct LocalStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open (or create) the store at `{data_dir}/console.db`.
    ///
    /// On open failure the file is treated as corrupt: it is deleted along
    /// with its WAL/SHM companions and opened once more.
    pub fn init(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("console.db");
        info!("Opening local store at {}", db_path.display());

        let conn = match open_and_configure(&db_path) {
            Ok(c) => c,
            Err(first_err) => {
                warn!(
                    "Local store open failed ({}), deleting and retrying once",
                    first_err
                );
                if db_path.exists() {
                    let _ = fs::remove_file(&db_path);
                    let _ = fs::remove_file(db_path.with_extension("db-wal"));
                    let _ = fs::remove_file(db_path.with_extension("db-shm"));
                }
                open_and_configure(&db_path)?
            }
        };

        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// Throwaway in-memory store, used by tests and when the data dir is
    /// not writable.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Get a setting value by category and key.
    pub fn get_setting(&self, category: &str, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT setting_value FROM local_settings
                 WHERE setting_category = ?1 AND setting_key = ?2",
                params![category, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or update a setting.
    pub fn set_setting(&self, category: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(setting_category, setting_key) DO UPDATE SET
                setting_value = excluded.setting_value,
                updated_at = excluded.updated_at",
            params![category, key, value],
        )?;
        Ok(())
    }

    /// Remove a setting. Missing keys are not an error.
    pub fn delete_setting(&self, category: &str, key: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
        )?;
        Ok(())
    }

    /// Read a JSON-encoded setting. Undecodable values are logged and
    /// reported as absent.
    pub fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        category: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.get_setting(category, key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(category, key, error = %e, "discarding undecodable local setting");
                Ok(None)
            }
        }
    }

    pub fn set_json<T: serde::Serialize + ?Sized>(
        &self,
        category: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set_setting(category, key, &raw)
    }
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating local store from v{current} to v{CURRENT_SCHEMA_VERSION}");
    if current < 1 {
        migrate_v1(conn)?;
    }
    Ok(())
}

/// Migration v1: key/value settings table.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        StoreError::from(e)
    })?;
    info!("Applied migration v1 (local_settings)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_upsert_and_delete() {
        let store = LocalStore::open_in_memory().unwrap();
        assert_eq!(store.get_setting("ui", "theme").unwrap(), None);

        store.set_setting("ui", "theme", "dark").unwrap();
        store.set_setting("ui", "theme", "light").unwrap();
        assert_eq!(store.get_setting("ui", "theme").unwrap().as_deref(), Some("light"));

        store.delete_setting("ui", "theme").unwrap();
        store.delete_setting("ui", "theme").unwrap();
        assert_eq!(store.get_setting("ui", "theme").unwrap(), None);
    }

    #[test]
    fn categories_are_independent() {
        let store = LocalStore::open_in_memory().unwrap();
        store.set_setting("a", "k", "1").unwrap();
        store.set_setting("b", "k", "2").unwrap();
        assert_eq!(store.get_setting("a", "k").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get_setting("b", "k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn undecodable_json_reads_as_absent() {
        let store = LocalStore::open_in_memory().unwrap();
        store.set_setting("cache", "list", "{not json").unwrap();
        let v: Option<Vec<u32>> = store.get_json("cache", "list").unwrap();
        assert!(v.is_none());

        store.set_json("cache", "list", &vec![1u32, 2, 3]).unwrap();
        let v: Option<Vec<u32>> = store.get_json("cache", "list").unwrap();
        assert_eq!(v, Some(vec![1, 2, 3]));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::init(dir.path()).unwrap();
            store.set_setting("ui", "theme", "system").unwrap();
        }
        let store = LocalStore::init(dir.path()).unwrap();
        assert_eq!(store.get_setting("ui", "theme").unwrap().as_deref(), Some("system"));
        assert!(store.path().unwrap().ends_with("console.db"));
    }
}
