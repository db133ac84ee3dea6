//! Task handles for in-flight image resolutions.
//!
//! A resolution runs as a spawned tokio task that pushes updates through an
//! unbounded channel. The handle owns the receiving end and the task, exposes
//! the latest observed state, and tears everything down on `cancel()` or drop.
//!
//! # Example
//!
//! ```ignore
//! let mut query = resolver.resolve_one("B00EXAMPLE");
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // When the consumer goes away
//! query.cancel();
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::images::{ImageMap, ImageState};

/// Sending side handed to a resolution task.
///
/// Once the handle is cancelled (or dropped) `emit` becomes a no-op and
/// `is_cancelled` turns true, so the task can skip side effects such as
/// cache writes.
pub struct Emitter<U> {
  tx: mpsc::UnboundedSender<U>,
  cancelled: Arc<AtomicBool>,
}

impl<U> Emitter<U> {
  /// Deliver an update. Returns `false` if nobody is listening anymore.
  pub fn emit(&self, update: U) -> bool {
    if self.is_cancelled() {
      return false;
    }
    self.tx.send(update).is_ok()
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst) || self.tx.is_closed()
  }
}

/// Owns the spawned task and its cancellation flag.
struct TaskControl {
  cancelled: Arc<AtomicBool>,
  task: JoinHandle<()>,
}

impl TaskControl {
  fn spawn<U, F, Fut>(run: F) -> (Self, mpsc::UnboundedReceiver<U>)
  where
    U: Send + 'static,
    F: FnOnce(Emitter<U>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let emitter = Emitter {
      tx,
      cancelled: Arc::clone(&cancelled),
    };
    let task = tokio::spawn(run(emitter));
    (Self { cancelled, task }, rx)
  }

  fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
    self.task.abort();
  }
}

impl Drop for TaskControl {
  fn drop(&mut self) {
    self.cancel();
  }
}

/// Handle for a bulk resolution.
///
/// Accumulates every locator the task reports. The task is finished once its
/// channel closes.
pub struct BulkQuery {
  images: ImageMap,
  receiver: Option<mpsc::UnboundedReceiver<ImageMap>>,
  control: TaskControl,
}

impl BulkQuery {
  pub(crate) fn spawn<F, Fut>(run: F) -> Self
  where
    F: FnOnce(Emitter<ImageMap>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let (control, receiver) = TaskControl::spawn(run);
    Self {
      images: ImageMap::new(),
      receiver: Some(receiver),
      control,
    }
  }

  /// Locators resolved so far.
  pub fn images(&self) -> &ImageMap {
    &self.images
  }

  pub fn is_finished(&self) -> bool {
    self.receiver.is_none()
  }

  /// Drain pending updates without blocking.
  ///
  /// Returns `true` if new locators arrived.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Some(receiver) = &mut self.receiver {
      match receiver.try_recv() {
        Ok(update) => {
          self.images.extend(update);
          changed = true;
        }
        Err(mpsc::error::TryRecvError::Empty) => break,
        Err(mpsc::error::TryRecvError::Disconnected) => self.receiver = None,
      }
    }
    changed
  }

  /// Wait for the next update.
  ///
  /// Returns the keys it carried, or `None` once the resolution is finished.
  pub async fn next(&mut self) -> Option<Vec<String>> {
    let receiver = self.receiver.as_mut()?;
    match receiver.recv().await {
      Some(update) => {
        let keys = update.keys().cloned().collect();
        self.images.extend(update);
        Some(keys)
      }
      None => {
        self.receiver = None;
        None
      }
    }
  }

  /// Wait until the resolution finishes and return everything resolved.
  pub async fn wait(&mut self) -> &ImageMap {
    while self.next().await.is_some() {}
    &self.images
  }

  /// Stop the resolution. No further updates are observed.
  pub fn cancel(&mut self) {
    self.control.cancel();
    self.receiver = None;
  }
}

/// Handle for a single-key resolution.
pub struct ImageQuery {
  key: String,
  state: ImageState,
  receiver: Option<mpsc::UnboundedReceiver<ImageState>>,
  control: TaskControl,
}

impl ImageQuery {
  pub(crate) fn spawn<F, Fut>(key: &str, run: F) -> Self
  where
    F: FnOnce(Emitter<ImageState>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let (control, receiver) = TaskControl::spawn(run);
    Self {
      key: key.to_string(),
      state: ImageState::Loading,
      receiver: Some(receiver),
      control,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn state(&self) -> &ImageState {
    &self.state
  }

  pub fn is_finished(&self) -> bool {
    self.receiver.is_none()
  }

  /// Drain pending states without blocking.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Some(receiver) = &mut self.receiver {
      match receiver.try_recv() {
        Ok(state) => {
          self.apply(state);
          changed = true;
        }
        Err(mpsc::error::TryRecvError::Empty) => break,
        Err(mpsc::error::TryRecvError::Disconnected) => {
          changed |= self.close();
        }
      }
    }
    changed
  }

  /// Wait for the next state. Returns `None` once the resolution is over.
  pub async fn next(&mut self) -> Option<&ImageState> {
    let receiver = self.receiver.as_mut()?;
    match receiver.recv().await {
      Some(state) => {
        self.apply(state);
        Some(&self.state)
      }
      None => {
        if self.close() {
          Some(&self.state)
        } else {
          None
        }
      }
    }
  }

  /// Wait for a terminal state.
  pub async fn wait(&mut self) -> &ImageState {
    while self.next().await.is_some() {}
    &self.state
  }

  /// Stop the resolution. The state stays as last observed.
  pub fn cancel(&mut self) {
    self.control.cancel();
    self.receiver = None;
  }

  fn apply(&mut self, state: ImageState) {
    if state.is_terminal() {
      self.receiver = None;
    }
    self.state = state;
  }

  /// Handle a closed channel. Returns `true` if that changed the state.
  fn close(&mut self) -> bool {
    self.receiver = None;
    if self.state.is_terminal() {
      return false;
    }
    // Sender dropped without a terminal state - treat as error
    self.state = ImageState::Error("Resolution ended without a result".to_string());
    true
  }
}

impl std::fmt::Debug for ImageQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ImageQuery")
      .field("key", &self.key)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
