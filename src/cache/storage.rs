//! Cache storage backends: SQLite, in-memory and no-op.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::CacheStorage;

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn load(&self, _namespace: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn save(&self, _namespace: &str, _blob: &str) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _namespace: &str) -> Result<()> {
    Ok(())
  }
}

/// Process-local storage. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
  blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn load(&self, namespace: &str) -> Result<Option<String>> {
    let blobs = self
      .blobs
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(blobs.get(namespace).cloned())
  }

  fn save(&self, namespace: &str, blob: &str) -> Result<()> {
    let mut blobs = self
      .blobs
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    blobs.insert(namespace.to_string(), blob.to_string());
    Ok(())
  }

  fn remove(&self, namespace: &str) -> Result<()> {
    let mut blobs = self
      .blobs
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    blobs.remove(namespace);
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the SQLite storage at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("asin-images").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One JSON document per namespace
CREATE TABLE IF NOT EXISTS kv_store (
    namespace TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStorage for SqliteStorage {
  fn load(&self, namespace: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE namespace = ?",
        params![namespace],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache namespace {}: {}", namespace, e))
  }

  fn save(&self, namespace: &str, blob: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (namespace, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![namespace, blob],
      )
      .map_err(|e| eyre!("Failed to write cache namespace {}: {}", namespace, e))?;

    Ok(())
  }

  fn remove(&self, namespace: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM kv_store WHERE namespace = ?",
        params![namespace],
      )
      .map_err(|e| eyre!("Failed to clear cache namespace {}: {}", namespace, e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_round_trip_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      assert_eq!(storage.load("ns").unwrap(), None);
      storage.save("ns", r#"{"a":1}"#).unwrap();
      storage.save("ns", r#"{"a":2}"#).unwrap();
    }

    let storage = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(storage.load("ns").unwrap().as_deref(), Some(r#"{"a":2}"#));
  }

  #[test]
  fn test_sqlite_namespaces_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open_at(&dir.path().join("cache.db")).unwrap();

    storage.save("one", "1").unwrap();
    storage.save("two", "2").unwrap();
    storage.remove("one").unwrap();

    assert_eq!(storage.load("one").unwrap(), None);
    assert_eq!(storage.load("two").unwrap().as_deref(), Some("2"));
  }

  #[test]
  fn test_noop_always_misses() {
    let storage = NoopStorage;
    storage.save("ns", "{}").unwrap();
    assert_eq!(storage.load("ns").unwrap(), None);
  }

  #[test]
  fn test_memory_remove() {
    let storage = MemoryStorage::new();
    storage.save("ns", "{}").unwrap();
    assert_eq!(storage.load("ns").unwrap().as_deref(), Some("{}"));
    storage.remove("ns").unwrap();
    assert_eq!(storage.load("ns").unwrap(), None);
  }
}
