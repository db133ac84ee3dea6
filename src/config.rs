use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::images::ResolverSettings;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub resolver: ResolverConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the image backend, e.g. https://backend.example.com/api
  pub base_url: Option<String>,
  /// Per-request timeout
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// Persist to SQLite under the data directory
  #[default]
  Sqlite,
  /// Keep entries for the lifetime of the process only
  Memory,
  /// Disable caching
  #[serde(rename = "none")]
  Disabled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub backend: CacheBackend,
  pub ttl_hours: i64,
  /// Database location (defaults to $XDG_DATA_HOME/asin-images/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      backend: CacheBackend::Sqlite,
      ttl_hours: 24,
      path: None,
    }
  }
}

impl CacheConfig {
  /// Validated time-to-live for cache entries.
  pub fn ttl(&self) -> Result<chrono::Duration> {
    if self.ttl_hours <= 0 {
      return Err(eyre!("cache.ttl_hours must be at least 1"));
    }
    chrono::Duration::try_hours(self.ttl_hours)
      .ok_or_else(|| eyre!("cache.ttl_hours out of range: {}", self.ttl_hours))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
  pub batch_size: usize,
  pub batch_delay_ms: u64,
  pub poll_interval_ms: u64,
  pub max_poll_attempts: u32,
  pub max_poll_failures: u32,
  pub placeholder_url: String,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    let settings = ResolverSettings::default();
    Self {
      batch_size: settings.batch_size,
      batch_delay_ms: settings.batch_delay.as_millis() as u64,
      poll_interval_ms: settings.poll_interval.as_millis() as u64,
      max_poll_attempts: settings.max_poll_attempts,
      max_poll_failures: settings.max_poll_failures,
      placeholder_url: settings.placeholder_url,
    }
  }
}

impl ResolverConfig {
  /// Validate and convert into resolver settings.
  pub fn settings(&self) -> Result<ResolverSettings> {
    if self.batch_size == 0 {
      return Err(eyre!("resolver.batch_size must be at least 1"));
    }
    if self.max_poll_attempts == 0 || self.max_poll_failures == 0 {
      return Err(eyre!(
        "resolver.max_poll_attempts and resolver.max_poll_failures must be at least 1"
      ));
    }

    Ok(ResolverSettings {
      batch_size: self.batch_size,
      batch_delay: Duration::from_millis(self.batch_delay_ms),
      poll_interval: Duration::from_millis(self.poll_interval_ms),
      max_poll_attempts: self.max_poll_attempts,
      max_poll_failures: self.max_poll_failures,
      placeholder_url: self.placeholder_url.clone(),
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./asin-images.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/asin-images/config.yaml
  ///
  /// Without any file the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("asin-images.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("asin-images").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// The backend base URL, which every command needs.
  pub fn base_url(&self) -> Result<&str> {
    self.api.base_url.as_deref().ok_or_else(|| {
      eyre!("No API base URL configured. Set api.base_url in the config file or pass --base-url.")
    })
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// Checks ASIN_IMAGES_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("ASIN_IMAGES_API_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }
}
