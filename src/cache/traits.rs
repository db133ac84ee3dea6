//! Core traits and types for the image cache.

use chrono::Utc;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};

/// A cached image locator for one ASIN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// Proxy locator (or placeholder) used to display the image
  pub url: String,
  /// When the entry was written, in epoch milliseconds
  pub timestamp: i64,
}

/// The whole persisted map, ASIN -> entry.
pub type CacheMap = BTreeMap<String, CacheEntry>;

/// Trait for raw cache storage backends.
///
/// A backend stores one opaque blob per namespace. The image cache keeps its
/// entire map as a single JSON object under one namespace, so every write is
/// a whole-blob replacement.
pub trait CacheStorage: Send + Sync {
  /// Read the blob stored under `namespace`, if any.
  fn load(&self, namespace: &str) -> Result<Option<String>>;

  /// Replace the blob stored under `namespace`.
  fn save(&self, namespace: &str, blob: &str) -> Result<()>;

  /// Delete the blob stored under `namespace`.
  fn remove(&self, namespace: &str) -> Result<()>;
}

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync {
  /// Current time in epoch milliseconds.
  fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_millis(&self) -> i64 {
    Utc::now().timestamp_millis()
  }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
  now: AtomicI64,
}

#[cfg(test)]
impl ManualClock {
  pub fn new(start_millis: i64) -> Self {
    Self {
      now: AtomicI64::new(start_millis),
    }
  }

  pub fn set(&self, millis: i64) {
    self.now.store(millis, Ordering::SeqCst);
  }

  pub fn advance(&self, millis: i64) {
    self.now.fetch_add(millis, Ordering::SeqCst);
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now_millis(&self) -> i64 {
    self.now.load(Ordering::SeqCst)
  }
}
