//! Single-key resolution with bounded polling while the backend works.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ImageCache;
use crate::query::Emitter;

use super::backend::ImageBackend;
use super::types::{proxy_url, ImageLookup, ImageState, ReadyCheck, ResolverSettings};

/// Progress of one queued key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
  /// Status checks that reported "not ready"
  pub attempt: u32,
  /// Consecutive status checks that failed outright
  pub failures: u32,
  pub queue_position: Option<u32>,
}

/// What to do after a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
  Ready,
  /// Keep polling; `queue_changed` when a new position was reported
  Wait { queue_changed: bool },
  GiveUp(String),
}

impl PollState {
  pub fn new(queue_position: Option<u32>) -> Self {
    Self {
      attempt: 0,
      failures: 0,
      queue_position,
    }
  }

  /// Fold one status check result into the state.
  pub fn advance(&mut self, check: Result<ReadyCheck>, settings: &ResolverSettings) -> PollStep {
    match check {
      Ok(check) if check.ready => PollStep::Ready,
      Ok(check) => {
        self.failures = 0;
        self.attempt += 1;

        let queue_changed =
          check.queue_position.is_some() && check.queue_position != self.queue_position;
        if queue_changed {
          self.queue_position = check.queue_position;
        }

        if self.attempt >= settings.max_poll_attempts {
          PollStep::GiveUp(format!(
            "Image still queued after {} status checks",
            self.attempt
          ))
        } else {
          PollStep::Wait { queue_changed }
        }
      }
      Err(e) => {
        self.failures += 1;
        warn!(error = %e, failures = self.failures, "Image status check failed");

        if self.failures >= settings.max_poll_failures {
          PollStep::GiveUp(format!(
            "Image status check failed {} times in a row: {}",
            self.failures, e
          ))
        } else {
          PollStep::Wait {
            queue_changed: false,
          }
        }
      }
    }
  }
}

/// Resolves one key, polling the status endpoint while it is queued.
pub struct SingleItemPoller {
  backend: Arc<dyn ImageBackend>,
  cache: Arc<ImageCache>,
  settings: ResolverSettings,
}

impl SingleItemPoller {
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

  /// Resolve `key`, emitting states until a terminal one.
  pub async fn run(&self, key: &str, out: &Emitter<ImageState>) {
    if let Some(url) = self.cache.lookup(key) {
      debug!(asin = key, "Serving image from cache");
      out.emit(ImageState::Ready { url });
      return;
    }

    let lookup = match self.backend.resolve_one(key).await {
      Ok(lookup) => lookup,
      Err(e) => {
        warn!(asin = key, error = %e, "Failed to resolve image");
        out.emit(ImageState::Error(e.to_string()));
        return;
      }
    };

    match lookup {
      ImageLookup::Cached { .. } => self.finish_ready(key, out),
      ImageLookup::Direct { .. } => {
        out.emit(ImageState::Ready {
          url: proxy_url(key),
        });
      }
      ImageLookup::NotFound => {
        out.emit(ImageState::Error(format!("No image found for {}", key)));
      }
      ImageLookup::Queued { queue_position } => {
        debug!(asin = key, ?queue_position, "Image queued, polling");
        out.emit(ImageState::Pending {
          url: self.settings.placeholder_url.clone(),
          queue_position,
        });
        self.poll(key, PollState::new(queue_position), out).await;
      }
    }
  }

  async fn poll(&self, key: &str, mut state: PollState, out: &Emitter<ImageState>) {
    loop {
      tokio::time::sleep(self.settings.poll_interval).await;
      if out.is_cancelled() {
        return;
      }

      let check = self.backend.check_ready(key).await;
      if out.is_cancelled() {
        return;
      }

      match state.advance(check, &self.settings) {
        PollStep::Ready => {
          info!(asin = key, attempts = state.attempt, "Queued image is ready");
          self.finish_ready(key, out);
          return;
        }
        PollStep::Wait { queue_changed } => {
          if queue_changed {
            out.emit(ImageState::Pending {
              url: self.settings.placeholder_url.clone(),
              queue_position: state.queue_position,
            });
          }
        }
        PollStep::GiveUp(reason) => {
          warn!(asin = key, attempts = state.attempt, failures = state.failures, "{}", reason);
          out.emit(ImageState::Error(reason));
          return;
        }
      }
    }
  }

  /// Write the proxy locator through to the cache and report it.
  fn finish_ready(&self, key: &str, out: &Emitter<ImageState>) {
    if out.is_cancelled() {
      return;
    }
    let url = proxy_url(key);
    self.cache.put(key, &url);
    out.emit(ImageState::Ready { url });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::images::testing::MockBackend;
  use crate::query::ImageQuery;
  use color_eyre::eyre::eyre;
  use std::time::Duration;

  fn setup(backend: MockBackend) -> (Arc<MockBackend>, Arc<ImageCache>, Arc<SingleItemPoller>) {
    let backend = Arc::new(backend);
    let cache = Arc::new(ImageCache::new(MemoryStorage::new(), "test"));
    let poller = Arc::new(SingleItemPoller::new(
      backend.clone(),
      cache.clone(),
      ResolverSettings::default(),
    ));
    (backend, cache, poller)
  }

  fn run(poller: &Arc<SingleItemPoller>, key: &str) -> ImageQuery {
    let poller = Arc::clone(poller);
    let owned = key.to_string();
    ImageQuery::spawn(key, move |out| async move { poller.run(&owned, &out).await })
  }

  fn queued(position: u32) -> ImageLookup {
    ImageLookup::Queued {
      queue_position: Some(position),
    }
  }

  fn not_ready(position: Option<u32>) -> Result<ReadyCheck> {
    Ok(ReadyCheck {
      ready: false,
      queue_position: position,
    })
  }

  fn ready() -> Result<ReadyCheck> {
    Ok(ReadyCheck {
      ready: true,
      queue_position: None,
    })
  }

  #[test]
  fn test_poll_state_gives_up_at_attempt_ceiling() {
    let settings = ResolverSettings::default();
    let mut state = PollState::new(None);
    for _ in 0..9 {
      assert!(matches!(
        state.advance(not_ready(None), &settings),
        PollStep::Wait { .. }
      ));
    }
    assert!(matches!(
      state.advance(not_ready(None), &settings),
      PollStep::GiveUp(_)
    ));
    assert_eq!(state.attempt, 10);
  }

  #[test]
  fn test_poll_state_failures_reset_on_success() {
    let settings = ResolverSettings::default();
    let mut state = PollState::new(Some(5));
    for _ in 0..4 {
      state.advance(Err(eyre!("timeout")), &settings);
    }
    assert_eq!(state.failures, 4);
    assert_eq!(state.attempt, 0);

    assert_eq!(
      state.advance(not_ready(Some(3)), &settings),
      PollStep::Wait {
        queue_changed: true
      }
    );
    assert_eq!(state.failures, 0);
    assert_eq!(state.queue_position, Some(3));

    assert_eq!(
      state.advance(not_ready(Some(3)), &settings),
      PollStep::Wait {
        queue_changed: false
      }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_cache_hit_skips_network() {
    let (backend, cache, poller) = setup(MockBackend::new());
    cache.put("B001", "/images/B001/proxy/public");

    let mut query = run(&poller, "B001");
    assert_eq!(
      query.wait().await,
      &ImageState::Ready {
        url: "/images/B001/proxy/public".to_string()
      }
    );
    assert!(backend.single_calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_cached_lookup_writes_through() {
    let (_, cache, poller) = setup(MockBackend::new().with_image("B002"));

    let mut query = run(&poller, "B002");
    assert!(query.wait().await.is_ready());
    assert_eq!(
      cache.lookup("B002").as_deref(),
      Some("/images/B002/proxy/public")
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_direct_lookup_is_not_cached() {
    let backend = MockBackend::new().with_lookup(
      "B003",
      ImageLookup::Direct {
        url: "https://origin.example.com/B003.jpg".to_string(),
      },
    );
    let (_, cache, poller) = setup(backend);

    let mut query = run(&poller, "B003");
    assert_eq!(query.wait().await.url(), Some("/images/B003/proxy/public"));
    assert!(cache.get("B003").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_not_found_and_failure_are_errors() {
    let backend = MockBackend::new().with_lookup("NF", ImageLookup::NotFound);
    let (_, _, poller) = setup(backend);

    assert!(matches!(
      run(&poller, "NF").wait().await,
      ImageState::Error(_)
    ));
    // Unknown keys make the mock fail the request
    assert!(matches!(
      run(&poller, "BOOM").wait().await,
      ImageState::Error(_)
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_queued_then_ready() {
    let backend = MockBackend::new()
      .with_lookup("Q", queued(4))
      .with_checks("Q", vec![not_ready(Some(2)), not_ready(Some(2)), ready()]);
    let (backend, cache, poller) = setup(backend);

    let mut query = run(&poller, "Q");
    let mut states = Vec::new();
    while let Some(state) = query.next().await {
      states.push(state.clone());
    }

    let placeholder = ResolverSettings::default().placeholder_url;
    assert_eq!(
      states,
      vec![
        ImageState::Pending {
          url: placeholder.clone(),
          queue_position: Some(4)
        },
        ImageState::Pending {
          url: placeholder,
          queue_position: Some(2)
        },
        ImageState::Ready {
          url: "/images/Q/proxy/public".to_string()
        },
      ]
    );
    assert_eq!(backend.check_calls().len(), 3);
    assert!(cache.lookup("Q").is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn test_polls_on_interval() {
    let backend = MockBackend::new()
      .with_lookup("Q", queued(1))
      .with_checks("Q", vec![not_ready(None), ready()]);
    let (backend, _, poller) = setup(backend);

    let start = tokio::time::Instant::now();
    run(&poller, "Q").wait().await;

    let times = backend.check_times();
    assert_eq!(times.len(), 2);
    assert!(times[0] - start >= Duration::from_secs(3));
    assert!(times[1] - times[0] >= Duration::from_secs(3));
  }

  #[tokio::test(start_paused = true)]
  async fn test_always_pending_stops_after_ten_checks() {
    let (backend, cache, poller) = setup(MockBackend::new().with_lookup("Q", queued(9)));

    let mut query = run(&poller, "Q");
    assert!(matches!(query.wait().await, ImageState::Error(_)));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.check_calls().len(), 10);
    assert!(cache.get("Q").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_streak_is_terminal() {
    let checks = (0..5).map(|_| Err(eyre!("503"))).collect();
    let backend = MockBackend::new()
      .with_lookup("Q", queued(1))
      .with_checks("Q", checks);
    let (backend, _, poller) = setup(backend);

    let mut query = run(&poller, "Q");
    assert!(matches!(query.wait().await, ImageState::Error(_)));
    assert_eq!(backend.check_calls().len(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_while_polling() {
    let backend = MockBackend::new()
      .with_lookup("Q", queued(1))
      .with_checks("Q", vec![ready()]);
    let (backend, cache, poller) = setup(backend);

    let mut query = run(&poller, "Q");
    assert!(matches!(query.next().await, Some(ImageState::Pending { .. })));
    query.cancel();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(backend.check_calls().is_empty());
    assert!(cache.get("Q").is_none());
    assert!(matches!(query.state(), ImageState::Pending { .. }));
  }
}
