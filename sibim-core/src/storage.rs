//! Key-value storage behind the cache and the session.
//!
//! Mirrors the browser `localStorage` surface the UI shells rely on: string
//! keys, string values, no expiry. [`MemoryStore`] is process-local;
//! [`RedbStore`] persists to disk.

use crate::error::{Result, SibimError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use redb::{Database, DatabaseError, ReadableTable, TableDefinition};

pub const USER_KEY: &str = "sibim_user";
pub const TOKEN_KEY: &str = "sibim_token";
pub const INVENTORY_CACHE_KEY: &str = "sibim_inventory_cache";
pub const CACHE_TIMESTAMP_KEY: &str = "sibim_cache_timestamp";
pub const THEME_KEY: &str = "sibim_theme";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }
}

const TABLE: TableDefinition<&str, &str> = TableDefinition::new("sibim");

/// Persistent store backed by an embedded redb database. Every write is its
/// own committed transaction, so an interrupted process never leaves a
/// half-written file behind.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`. An unreadable file is moved
    /// aside to `<path>.corrupt` and replaced by an empty store: everything
    /// in it is either cache or a session that can be re-established.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = match Database::create(path) {
            Ok(db) => db,
            Err(e @ DatabaseError::DatabaseAlreadyOpen) => return Err(storage_err(e)),
            Err(e) if path.exists() => {
                let aside = corrupt_path(path);
                tracing::warn!(
                    "⚠️ Storage at {} is unreadable ({}); moving it to {} and starting empty",
                    path.display(),
                    e,
                    aside.display()
                );
                fs::rename(path, &aside)?;
                Database::create(path).map_err(storage_err)?
            }
            Err(e) => return Err(storage_err(e)),
        };

        let write_txn = db.begin_write().map_err(storage_err)?;
        {
            let _table = write_txn.open_table(TABLE).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        tracing::debug!("Opened storage at {}", path.display());
        Ok(Self { db })
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TABLE).map_err(storage_err)?;
        let value = table.get(key).map_err(storage_err)?;
        Ok(value.map(|v| v.value().to_string()))
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TABLE).map_err(storage_err)?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (key, _) = entry.map_err(storage_err)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read(key).unwrap_or_else(|e| {
            tracing::warn!("Could not read {} from storage: {}", key, e);
            None
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage_err)?;
            table.insert(key, value).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage_err)?;
            table.remove(key).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)
    }

    fn keys(&self) -> Vec<String> {
        self.all_keys().unwrap_or_else(|e| {
            tracing::warn!("Could not list storage keys: {}", e);
            Vec::new()
        })
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn storage_err(e: impl std::fmt::Display) -> SibimError {
    SibimError::Storage(e.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basics() {
        let store = MemoryStore::new();
        assert!(store.get(THEME_KEY).is_none());

        store.set(THEME_KEY, "dark").unwrap();
        assert_eq!(store.get(THEME_KEY).as_deref(), Some("dark"));
        assert_eq!(store.keys(), vec![THEME_KEY.to_string()]);

        store.remove(THEME_KEY).unwrap();
        assert!(store.get(THEME_KEY).is_none());
        // Removing twice is fine
        store.remove(THEME_KEY).unwrap();
    }

    #[test]
    fn test_redb_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.set(USER_KEY, r#"{"username":"ana"}"#).unwrap();
            store.set(THEME_KEY, "light").unwrap();
            store.remove(THEME_KEY).unwrap();
            store.remove(TOKEN_KEY).unwrap();
        }

        let reopened = RedbStore::open(&path).unwrap();
        assert_eq!(reopened.get(USER_KEY).as_deref(), Some(r#"{"username":"ana"}"#));
        assert!(reopened.get(THEME_KEY).is_none());
        assert_eq!(reopened.keys(), vec![USER_KEY.to_string()]);
    }

    #[test]
    fn test_unreadable_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.redb");
        fs::write(&path, "not a database, just a torn write").unwrap();

        let store = RedbStore::open(&path).unwrap();
        assert!(store.keys().is_empty());
        store.set(THEME_KEY, "dark").unwrap();
        assert_eq!(store.get(THEME_KEY).as_deref(), Some("dark"));
        assert!(dir.path().join("storage.redb.corrupt").exists());
    }
}
