//! Bulk resolution: cache hits first, then sequential batches for the rest.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ImageCache;
use crate::query::Emitter;

use super::backend::ImageBackend;
use super::types::{proxy_url, ImageLookup, ImageMap, ResolverSettings};

/// Resolves many keys with as few backend calls as the cache allows.
///
/// Misses go out in chunks of `batch_size`, one chunk at a time with
/// `batch_delay` between them so a large catalog never bursts the backend.
/// A chunk whose batch call fails is retried once as individual lookups.
pub struct BatchResolver {
  backend: Arc<dyn ImageBackend>,
  cache: Arc<ImageCache>,
  settings: ResolverSettings,
}

impl BatchResolver {
  pub fn new(
    backend: Arc<dyn ImageBackend>,
    cache: Arc<ImageCache>,
    settings: ResolverSettings,
  ) -> Self {
    Self {
      backend,
      cache,
      settings,
    }
  }

  /// Resolve `keys`, emitting cached locators first and then one update per
  /// chunk that resolved anything.
  pub async fn run(&self, keys: &[String], out: &Emitter<ImageMap>) {
    if keys.is_empty() {
      return;
    }

    let hits = self.cache.lookup_many(keys);
    if !hits.is_empty() {
      debug!(hits = hits.len(), "Serving images from cache");
      out.emit(hits.clone());
    }

    let misses = unique_misses(keys, &hits);
    if misses.is_empty() {
      return;
    }

    let batch_size = self.settings.batch_size.max(1);
    let chunks: Vec<&[String]> = misses.chunks(batch_size).collect();
    let mut resolved_total = 0;

    for (index, chunk) in chunks.iter().enumerate() {
      if out.is_cancelled() {
        return;
      }

      debug!(
        chunk = index + 1,
        of = chunks.len(),
        size = chunk.len(),
        "Requesting image batch"
      );

      let resolved = match self.backend.resolve_batch(chunk).await {
        Ok(results) => {
          for key in chunk.iter().filter(|key| !results.contains_key(*key)) {
            debug!(asin = %key, "No image in batch response, leaving unresolved");
          }
          results.into_keys().collect::<Vec<_>>()
        }
        Err(e) => {
          warn!(error = %e, size = chunk.len(), "Image batch failed, resolving individually");
          self.resolve_individually(chunk).await
        }
      };

      if out.is_cancelled() {
        return;
      }

      if !resolved.is_empty() {
        let update: ImageMap = resolved
          .into_iter()
          .map(|key| {
            let url = proxy_url(&key);
            self.cache.put(&key, &url);
            (key, url)
          })
          .collect();
        resolved_total += update.len();
        out.emit(update);
      }

      if index + 1 < chunks.len() {
        tokio::time::sleep(self.settings.batch_delay).await;
      }
    }

    info!(
      requested = misses.len(),
      resolved = resolved_total,
      "Image batch resolution finished"
    );
  }

  /// Fallback for a failed chunk: one independent lookup per key.
  ///
  /// Returns the keys that produced an image. Everything else is logged and
  /// left unresolved.
  async fn resolve_individually(&self, chunk: &[String]) -> Vec<String> {
    let lookups = join_all(chunk.iter().map(|key| self.backend.resolve_one(key))).await;

    chunk
      .iter()
      .zip(lookups)
      .filter_map(|(key, lookup)| match lookup {
        Ok(ImageLookup::Cached { .. } | ImageLookup::Direct { .. }) => Some(key.clone()),
        Ok(ImageLookup::Queued { queue_position }) => {
          debug!(asin = %key, ?queue_position, "Image queued, leaving unresolved");
          None
        }
        Ok(ImageLookup::NotFound) => {
          warn!(asin = %key, "No image found");
          None
        }
        Err(e) => {
          warn!(asin = %key, error = %e, "Failed to resolve image");
          None
        }
      })
      .collect()
  }
}

/// Keys without a cache hit, first occurrence order, no duplicates.
fn unique_misses(keys: &[String], hits: &ImageMap) -> Vec<String> {
  let mut seen = HashSet::new();
  keys
    .iter()
    .filter(|key| !hits.contains_key(*key))
    .filter(|key| seen.insert(key.as_str()))
    .cloned()
    .collect()
}
