use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Resolved locators keyed by ASIN.
pub type ImageMap = HashMap<String, String>;

/// Canonical locator for a resolved image.
///
/// This is what gets cached and handed to consumers, never the backend's
/// internal URL.
pub fn proxy_url(key: &str) -> String {
  format!("/images/{}/proxy/public", key)
}

/// Outcome of a single-item lookup against the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLookup {
  /// Image already stored by the backend
  Cached { url: String },
  /// Image is being produced; poll the check endpoint
  Queued { queue_position: Option<u32> },
  /// Image available at an uncached location
  Direct { url: String },
  NotFound,
}

/// Status check result for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadyCheck {
  pub ready: bool,
  pub queue_position: Option<u32>,
}

/// Observable state of a single-item resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
  /// Nothing reported yet
  Loading,
  /// Queued on the backend; `url` is the placeholder to show meanwhile
  Pending {
    url: String,
    queue_position: Option<u32>,
  },
  Ready { url: String },
  Error(String),
}

impl ImageState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, ImageState::Ready { .. } | ImageState::Error(_))
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, ImageState::Ready { .. })
  }

  pub fn url(&self) -> Option<&str> {
    match self {
      ImageState::Pending { url, .. } | ImageState::Ready { url } => Some(url),
      _ => None,
    }
  }
}

impl fmt::Display for ImageState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ImageState::Loading => write!(f, "loading"),
      ImageState::Pending {
        queue_position: Some(pos),
        ..
      } => write!(f, "pending (queue position {})", pos),
      ImageState::Pending { .. } => write!(f, "pending"),
      ImageState::Ready { url } => write!(f, "ready {}", url),
      ImageState::Error(e) => write!(f, "error: {}", e),
    }
  }
}

/// Tuning for batching and polling.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
  /// Maximum keys per batch request
  pub batch_size: usize,
  /// Pause between consecutive batch requests
  pub batch_delay: Duration,
  /// Pause between status checks while queued
  pub poll_interval: Duration,
  /// Status checks reporting "not ready" before giving up
  pub max_poll_attempts: u32,
  /// Consecutive failed status checks before giving up
  pub max_poll_failures: u32,
  /// Locator shown while an image is queued
  pub placeholder_url: String,
}

impl Default for ResolverSettings {
  fn default() -> Self {
    Self {
      batch_size: 5,
      batch_delay: Duration::from_secs(1),
      poll_interval: Duration::from_secs(3),
      max_poll_attempts: 10,
      max_poll_failures: 5,
      placeholder_url: "/images/placeholder.png".to_string(),
    }
  }
}
