use chrono::{TimeZone, Utc};
use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheEntry, ImageCache, MemoryStorage, NoopStorage, SqliteStorage};
use crate::config::{CacheBackend, Config};
use crate::images::{ImageClient, ImageResolver, ImageState};
use crate::query::ImageQuery;

/// Cache maintenance actions
#[derive(Debug, Clone)]
pub enum CacheAction {
  Show,
  Get(String),
  Clear,
}

/// Wires configuration, cache and backend client together and runs commands.
pub struct App {
  cache: Arc<ImageCache>,
  resolver: ImageResolver,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let cache = Arc::new(Self::open_cache(config)?);
    let client = ImageClient::new(config)?;
    let settings = config.resolver.settings()?;
    let resolver = ImageResolver::new(Arc::new(client), Arc::clone(&cache), settings);

    Ok(Self { cache, resolver })
  }

  fn open_cache(config: &Config) -> Result<ImageCache> {
    let namespace = ImageCache::namespace_for(config.base_url()?);
    let ttl = config.cache.ttl()?;

    let cache = match config.cache.backend {
      CacheBackend::Sqlite => {
        let storage = match &config.cache.path {
          Some(path) => SqliteStorage::open_at(path)?,
          None => SqliteStorage::open()?,
        };
        ImageCache::new(storage, namespace)
      }
      CacheBackend::Memory => ImageCache::new(MemoryStorage::new(), namespace),
      CacheBackend::Disabled => ImageCache::new(NoopStorage, namespace),
    };

    Ok(cache.with_ttl(ttl))
  }

  /// Resolve `asins` in bulk, printing each update as it arrives.
  pub async fn resolve(&self, asins: Vec<String>) -> Result<()> {
    let requested = asins.len();
    let mut query = self.resolver.resolve_many(asins.clone());

    while let Some(keys) = query.next().await {
      for key in keys {
        println!("{}\t{}", key, query.images()[&key]);
      }
    }

    for asin in asins.iter().filter(|a| !query.images().contains_key(*a)) {
      println!("{}\tunresolved", asin);
    }

    info!(
      requested,
      resolved = query.images().len(),
      "Bulk resolution complete"
    );
    Ok(())
  }

  /// Resolve each ASIN in turn on one slot, printing state transitions.
  ///
  /// Ctrl-C cancels the current resolution and stops.
  pub async fn watch(&self, asins: Vec<String>) -> Result<()> {
    let mut slot = self.resolver.slot();

    for asin in asins {
      let query = slot.watch(&asin);
      let interrupted = tokio::select! {
        _ = print_states(query) => false,
        _ = tokio::signal::ctrl_c() => true,
      };

      if interrupted {
        slot.cancel();
        println!("{}\tcancelled", asin);
        break;
      }
    }

    Ok(())
  }

  pub fn cache(&self, action: CacheAction) -> Result<()> {
    match action {
      CacheAction::Show => {
        let entries = self.cache.entries();
        if entries.is_empty() {
          println!("cache {} is empty", self.cache.namespace());
        }
        for (asin, entry) in &entries {
          self.print_entry(asin, entry);
        }
      }
      CacheAction::Get(asin) => match self.cache.get(&asin) {
        Some(entry) => self.print_entry(&asin, &entry),
        None => println!("{}\tnot cached", asin),
      },
      CacheAction::Clear => {
        self.cache.clear()?;
        info!(namespace = self.cache.namespace(), "Image cache cleared");
        println!("cache {} cleared", self.cache.namespace());
      }
    }
    Ok(())
  }

  fn print_entry(&self, asin: &str, entry: &CacheEntry) {
    let validity = if self.cache.is_valid(entry) {
      "valid"
    } else {
      "stale"
    };
    println!(
      "{}\t{}\t{}\t{}",
      asin,
      entry.url,
      format_timestamp(entry.timestamp),
      validity
    );
  }
}

async fn print_states(query: &mut ImageQuery) {
  let key = query.key().to_string();
  while let Some(state) = query.next().await {
    match state {
      ImageState::Ready { url } => println!("{}\tready\t{}", key, url),
      other => println!("{}\t{}", key, other),
    }
  }
}

fn format_timestamp(millis: i64) -> String {
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .map(|t| t.to_rfc3339())
    .unwrap_or_else(|| millis.to_string())
}
