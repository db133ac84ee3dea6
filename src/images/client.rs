use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use url::Url;

use crate::config::Config;

use super::api_types::{ApiBatchResponse, ApiCheckResponse, ApiImageResponse, ApiKeysRequest};
use super::backend::ImageBackend;
use super::types::{ImageLookup, ImageMap, ReadyCheck};

/// HTTP client for the image backend
#[derive(Clone)]
pub struct ImageClient {
  http: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl ImageClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_options(
      config.base_url()?,
      Duration::from_secs(config.api.timeout_secs),
      Config::get_api_token(),
    )
  }

  pub fn with_options(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL cannot be a base: {}", base_url));
    }

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  /// Build `{base}/{segments...}`, percent-encoding each segment.
  fn endpoint(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("API base URL cannot be a base: {}", self.base_url))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }
}

#[async_trait]
impl ImageBackend for ImageClient {
  async fn resolve_batch(&self, keys: &[String]) -> Result<ImageMap> {
    let url = self.endpoint(&["images", "batch"])?;

    let response: ApiBatchResponse = self
      .authorize(self.http.post(url))
      .json(&ApiKeysRequest { keys })
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to resolve image batch: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse image batch response: {}", e))?;

    Ok(response.into_resolved())
  }

  async fn resolve_one(&self, key: &str) -> Result<ImageLookup> {
    let url = self.endpoint(&["images", key])?;

    let response = self
      .authorize(self.http.get(url))
      .send()
      .await
      .map_err(|e| eyre!("Failed to resolve image {}: {}", key, e))?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(ImageLookup::NotFound);
    }

    let body: ApiImageResponse = response
      .error_for_status()
      .map_err(|e| eyre!("Failed to resolve image {}: {}", key, e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse image response for {}: {}", key, e))?;

    Ok(body.into_lookup())
  }

  async fn check_ready(&self, key: &str) -> Result<ReadyCheck> {
    let url = self.endpoint(&["images", "check"])?;
    let keys = [key.to_string()];

    let mut response: ApiCheckResponse = self
      .authorize(self.http.post(url))
      .json(&ApiKeysRequest { keys: &keys })
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to check image status for {}: {}", key, e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse image status for {}: {}", key, e))?;

    // A key the backend does not report on yet is still queued.
    Ok(
      response
        .results
        .remove(key)
        .map(ReadyCheck::from)
        .unwrap_or_default(),
    )
  }
}
