//! Persistent cache for resolved product-image locators.
//!
//! This module provides the storage side of image resolution:
//! - Keeps ASIN -> {url, timestamp} as one JSON document per backend
//! - Serves entries only while younger than the TTL (24 hours by default)
//! - Treats unreadable or corrupt documents as empty and resets them
//! - Swallows write failures, caching is best-effort

mod layer;
mod storage;
mod traits;

pub use layer::ImageCache;
pub use storage::{MemoryStorage, NoopStorage, SqliteStorage};
#[cfg(test)]
pub use traits::ManualClock;
pub use traits::{CacheEntry, CacheStorage, Clock, SystemClock};
