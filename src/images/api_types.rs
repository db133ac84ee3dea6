//! Serde types matching the image backend's request and response bodies.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on what the resolvers need.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{ImageLookup, ReadyCheck};

/// `method` value reported when the backend has queued the image for processing.
pub const METHOD_QUEUED: &str = "queued_for_processing";

/// Body of the batch and check endpoints.
#[derive(Debug, Serialize)]
pub struct ApiKeysRequest<'a> {
  pub keys: &'a [String],
}

// ============================================================================
// POST /images/batch
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ApiBatchItem {
  pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiBatchResponse {
  #[serde(default)]
  pub results: HashMap<String, ApiBatchItem>,
}

impl ApiBatchResponse {
  /// Keys whose image was resolved, with the backend's locator.
  pub fn into_resolved(self) -> HashMap<String, String> {
    self
      .results
      .into_iter()
      .filter_map(|(key, item)| match item.image_url {
        Some(url) if !url.is_empty() => Some((key, url)),
        _ => None,
      })
      .collect()
  }
}

// ============================================================================
// GET /images/{key}
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ApiImageResponse {
  #[serde(default)]
  pub cached: bool,
  pub image_url: Option<String>,
  pub method: Option<String>,
  pub queue_position: Option<u32>,
}

impl ApiImageResponse {
  pub fn into_lookup(self) -> ImageLookup {
    let url = self.image_url.filter(|u| !u.is_empty());

    if self.cached {
      if let Some(url) = url {
        return ImageLookup::Cached { url };
      }
    }

    if self.method.as_deref() == Some(METHOD_QUEUED) {
      return ImageLookup::Queued {
        queue_position: self.queue_position,
      };
    }

    match url {
      Some(url) => ImageLookup::Direct { url },
      None => ImageLookup::NotFound,
    }
  }
}

// ============================================================================
// POST /images/check
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ApiCheckItem {
  #[serde(default)]
  pub ready: bool,
  pub queue_position: Option<u32>,
}

impl From<ApiCheckItem> for ReadyCheck {
  fn from(item: ApiCheckItem) -> Self {
    ReadyCheck {
      ready: item.ready,
      queue_position: item.queue_position,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiCheckResponse {
  #[serde(default)]
  pub results: HashMap<String, ApiCheckItem>,
}
