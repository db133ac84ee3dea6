//! Image cache that keeps ASIN -> locator entries under one storage namespace.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::traits::{CacheEntry, CacheMap, CacheStorage, Clock, SystemClock};

/// Namespace prefix for the persisted cache document.
const NAMESPACE_PREFIX: &str = "asin_image_cache";

/// Persistent image cache with TTL-based validity.
///
/// The whole map lives in a single JSON document. Every write reads the full
/// document, replaces one key and writes it back while holding `write_lock`,
/// so the batch and single-item paths never clobber each other's keys.
/// Storage failures never reach the caller: a corrupt or unreadable document
/// reads as empty (and is reset), a failed write is logged and dropped.
pub struct ImageCache {
  storage: Arc<dyn CacheStorage>,
  clock: Arc<dyn Clock>,
  namespace: String,
  /// How long an entry stays servable
  ttl: Duration,
  write_lock: Mutex<()>,
}

impl ImageCache {
  /// Create a cache over `storage` using the given namespace.
  pub fn new(storage: impl CacheStorage + 'static, namespace: impl Into<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      clock: Arc::new(SystemClock),
      namespace: namespace.into(),
      ttl: Duration::hours(24),
      write_lock: Mutex::new(()),
    }
  }

  /// Set the time-to-live for entries.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Replace the clock used for timestamps and validity checks.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Namespace for the cache of a given backend.
  ///
  /// Hashing the base URL keeps caches for different backends apart.
  pub fn namespace_for(base_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base_url.trim_end_matches('/').as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}:{}", NAMESPACE_PREFIX, &digest[..12])
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  /// Get the entry for `key`, valid or not.
  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    let guard = self.lock();
    self.read_map(&guard).remove(key)
  }

  /// Check whether an entry can still be served.
  pub fn is_valid(&self, entry: &CacheEntry) -> bool {
    let age = self.clock.now_millis() - entry.timestamp;
    age < self.ttl.num_milliseconds() && !entry.url.is_empty()
  }

  /// Locator of a valid entry for `key`.
  pub fn lookup(&self, key: &str) -> Option<String> {
    self
      .get(key)
      .filter(|entry| self.is_valid(entry))
      .map(|entry| entry.url)
  }

  /// Valid locators for every key in `keys` that has one.
  ///
  /// Reads the document once regardless of how many keys are asked for.
  pub fn lookup_many(&self, keys: &[String]) -> HashMap<String, String> {
    let guard = self.lock();
    let map = self.read_map(&guard);
    keys
      .iter()
      .filter_map(|key| {
        map
          .get(key)
          .filter(|entry| self.is_valid(entry))
          .map(|entry| (key.clone(), entry.url.clone()))
      })
      .collect()
  }

  /// Create or overwrite the entry for `key` with `timestamp = now`.
  pub fn put(&self, key: &str, url: &str) {
    let guard = self.lock();
    let mut map = self.read_map(&guard);
    map.insert(
      key.to_string(),
      CacheEntry {
        url: url.to_string(),
        timestamp: self.clock.now_millis(),
      },
    );

    if let Err(e) = self.write_map(&map) {
      warn!(asin = key, error = %e, "Failed to write image cache entry");
    }
  }

  /// Every stored entry, including stale ones.
  pub fn entries(&self) -> CacheMap {
    let guard = self.lock();
    self.read_map(&guard)
  }

  /// Remove the whole cache document.
  pub fn clear(&self) -> Result<()> {
    let _guard = self.lock();
    self.storage.remove(&self.namespace)
  }

  fn lock(&self) -> MutexGuard<'_, ()> {
    // The guarded value is (), so a poisoned lock carries no broken state.
    self
      .write_lock
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Read and decode the document. Must be called with the write lock held.
  fn read_map(&self, _guard: &MutexGuard<'_, ()>) -> CacheMap {
    let blob = match self.storage.load(&self.namespace) {
      Ok(Some(blob)) => blob,
      Ok(None) => return CacheMap::new(),
      Err(e) => {
        warn!(error = %e, "Image cache unreadable, resetting");
        self.reset();
        return CacheMap::new();
      }
    };

    match serde_json::from_str::<CacheMap>(&blob) {
      Ok(map) => map,
      Err(e) => {
        warn!(error = %e, "Image cache corrupt, resetting");
        self.reset();
        CacheMap::new()
      }
    }
  }

  fn write_map(&self, map: &CacheMap) -> Result<()> {
    let blob =
      serde_json::to_string(map).map_err(|e| eyre!("Failed to serialize image cache: {}", e))?;
    self.storage.save(&self.namespace, &blob)
  }

  fn reset(&self) {
    if let Err(e) = self.write_map(&CacheMap::new()) {
      warn!(error = %e, "Failed to reset image cache");
    } else {
      debug!(namespace = %self.namespace, "Image cache reset");
    }
  }
}
