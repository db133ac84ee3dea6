//! Public entry points for image resolution.

use std::sync::Arc;

use crate::cache::ImageCache;
use crate::query::{BulkQuery, ImageQuery};

use super::backend::ImageBackend;
use super::batch::BatchResolver;
use super::poller::SingleItemPoller;
use super::types::ResolverSettings;

/// Image resolution with caching, batching and polling.
///
/// Both entry points return a handle that owns the running task. Cancelling
/// or dropping the handle stops the task and any further updates.
#[derive(Clone)]
pub struct ImageResolver {
  batch: Arc<BatchResolver>,
  poller: Arc<SingleItemPoller>,
}

impl ImageResolver {
  pub fn new(
    backend: Arc<dyn ImageBackend>,
    cache: Arc<ImageCache>,
    settings: ResolverSettings,
  ) -> Self {
    Self {
      batch: Arc::new(BatchResolver::new(
        Arc::clone(&backend),
        Arc::clone(&cache),
        settings.clone(),
      )),
      poller: Arc::new(SingleItemPoller::new(backend, cache, settings)),
    }
  }

  /// Resolve many keys. Cached locators arrive first, the rest as batches
  /// complete.
  pub fn resolve_many(&self, keys: Vec<String>) -> BulkQuery {
    let batch = Arc::clone(&self.batch);
    BulkQuery::spawn(move |out| async move { batch.run(&keys, &out).await })
  }

  /// Resolve one key, polling while the backend is still producing it.
  pub fn resolve_one(&self, key: &str) -> ImageQuery {
    let poller = Arc::clone(&self.poller);
    let owned = key.to_string();
    ImageQuery::spawn(key, move |out| async move { poller.run(&owned, &out).await })
  }

  /// A consumer that shows one key at a time.
  pub fn slot(&self) -> ImageSlot {
    ImageSlot {
      resolver: self.clone(),
      current: None,
    }
  }
}

/// Single-image consumer.
///
/// Watching a different key cancels the resolution of the previous one, so
/// a stale key can never overwrite the state of the current one.
pub struct ImageSlot {
  resolver: ImageResolver,
  current: Option<ImageQuery>,
}

impl ImageSlot {
  /// Show `key`. Re-watching the current key keeps its resolution running.
  pub fn watch(&mut self, key: &str) -> &mut ImageQuery {
    if let Some(mut previous) = self.current.take() {
      if previous.key() == key {
        return self.current.insert(previous);
      }
      previous.cancel();
    }
    self.current.insert(self.resolver.resolve_one(key))
  }

  pub fn current(&mut self) -> Option<&mut ImageQuery> {
    self.current.as_mut()
  }

  /// Stop showing anything.
  pub fn cancel(&mut self) {
    if let Some(mut query) = self.current.take() {
      query.cancel();
    }
  }
}
