//! Scriptable `ImageBackend` for resolver tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use super::backend::ImageBackend;
use super::types::{ImageLookup, ImageMap, ReadyCheck};

/// In-memory backend that records every call.
///
/// - Keys added with `with_image` resolve in batches and as cached lookups.
/// - `with_lookup` overrides the single-item answer for a key.
/// - Single lookups for unknown keys fail.
/// - Status checks replay the script from `with_checks`, then report
///   "not ready" forever.
#[derive(Default)]
pub struct MockBackend {
  images: HashMap<String, String>,
  lookups: HashMap<String, ImageLookup>,
  checks: Mutex<HashMap<String, VecDeque<Result<ReadyCheck>>>>,
  batch_fails: bool,
  batch_calls: Mutex<Vec<(Vec<String>, Instant)>>,
  single_calls: Mutex<Vec<String>>,
  check_calls: Mutex<Vec<(String, Instant)>>,
}

impl MockBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_image(mut self, key: &str) -> Self {
    self.images.insert(
      key.to_string(),
      format!("https://cdn.example.com/{}.jpg", key),
    );
    self
  }

  pub fn with_lookup(mut self, key: &str, lookup: ImageLookup) -> Self {
    self.lookups.insert(key.to_string(), lookup);
    self
  }

  pub fn with_checks(self, key: &str, script: Vec<Result<ReadyCheck>>) -> Self {
    self
      .checks
      .lock()
      .unwrap()
      .insert(key.to_string(), script.into());
    self
  }

  pub fn failing_batch(mut self) -> Self {
    self.batch_fails = true;
    self
  }

  pub fn batch_calls(&self) -> Vec<Vec<String>> {
    let calls = self.batch_calls.lock().unwrap();
    calls.iter().map(|(keys, _)| keys.clone()).collect()
  }

  pub fn batch_times(&self) -> Vec<Instant> {
    let calls = self.batch_calls.lock().unwrap();
    calls.iter().map(|(_, at)| *at).collect()
  }

  pub fn single_calls(&self) -> Vec<String> {
    self.single_calls.lock().unwrap().clone()
  }

  pub fn check_calls(&self) -> Vec<String> {
    let calls = self.check_calls.lock().unwrap();
    calls.iter().map(|(key, _)| key.clone()).collect()
  }

  pub fn check_times(&self) -> Vec<Instant> {
    let calls = self.check_calls.lock().unwrap();
    calls.iter().map(|(_, at)| *at).collect()
  }
}

#[async_trait]
impl ImageBackend for MockBackend {
  async fn resolve_batch(&self, keys: &[String]) -> Result<ImageMap> {
    self
      .batch_calls
      .lock()
      .unwrap()
      .push((keys.to_vec(), Instant::now()));

    if self.batch_fails {
      return Err(eyre!("batch endpoint returned 503"));
    }

    Ok(
      keys
        .iter()
        .filter_map(|key| self.images.get(key).map(|url| (key.clone(), url.clone())))
        .collect(),
    )
  }

  async fn resolve_one(&self, key: &str) -> Result<ImageLookup> {
    self.single_calls.lock().unwrap().push(key.to_string());

    if let Some(lookup) = self.lookups.get(key) {
      return Ok(lookup.clone());
    }
    match self.images.get(key) {
      Some(url) => Ok(ImageLookup::Cached { url: url.clone() }),
      None => Err(eyre!("connection reset resolving {}", key)),
    }
  }

  async fn check_ready(&self, key: &str) -> Result<ReadyCheck> {
    self
      .check_calls
      .lock()
      .unwrap()
      .push((key.to_string(), Instant::now()));

    let next = self
      .checks
      .lock()
      .unwrap()
      .get_mut(key)
      .and_then(VecDeque::pop_front);
    next.unwrap_or(Ok(ReadyCheck::default()))
  }
}
