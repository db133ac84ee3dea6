//! Backend contract consumed by the resolvers.

use async_trait::async_trait;
use color_eyre::Result;

use super::types::{ImageLookup, ImageMap, ReadyCheck};

/// Remote image-resolution service.
///
/// Errors mean the call itself failed (transport, non-2xx status, bad
/// body). A key the backend simply has no image for is not an error.
#[async_trait]
pub trait ImageBackend: Send + Sync {
  /// Resolve several keys in one round trip.
  ///
  /// # Returns
  /// Backend locators for the keys that resolved; other keys are omitted.
  async fn resolve_batch(&self, keys: &[String]) -> Result<ImageMap>;

  /// Resolve one key.
  async fn resolve_one(&self, key: &str) -> Result<ImageLookup>;

  /// Ask whether a queued key has been produced yet.
  async fn check_ready(&self, key: &str) -> Result<ReadyCheck>;
}
