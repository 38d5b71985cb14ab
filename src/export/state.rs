//! Observable per-consumer export state.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::types::{ExportStatus, ExportedFile};

/// Snapshot of one consumer's export workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportState {
  /// A creation request is in flight
  pub loading: bool,
  pub current_job_id: Option<String>,
  /// `None` while idle
  pub current_status: Option<ExportStatus>,
  /// Newest first
  pub exported_files: Vec<ExportedFile>,
  /// Why the current or last export failed
  pub error: Option<String>,
  /// Why the last file-list reload failed; cleared by a successful reload
  pub load_error: Option<String>,
}

impl ExportState {
  pub fn is_idle(&self) -> bool {
    self.current_status.is_none()
  }

  /// A job is pending or processing
  pub fn is_in_progress(&self) -> bool {
    self.current_status.is_some_and(|s| s.is_active())
  }

  /// The job this state is currently tracking, if it is `job_id`.
  pub fn tracks(&self, job_id: &str) -> bool {
    self.current_job_id.as_deref() == Some(job_id)
  }
}

/// Replace-style store over a `watch` channel; last write wins.
#[derive(Clone)]
pub struct ExportStore {
  tx: Arc<watch::Sender<ExportState>>,
}

impl ExportStore {
  pub fn new() -> Self {
    let (tx, _) = watch::channel(ExportState::default());
    Self { tx: Arc::new(tx) }
  }

  pub fn snapshot(&self) -> ExportState {
    self.tx.borrow().clone()
  }

  /// Apply `f` and notify subscribers.
  pub fn update(&self, f: impl FnOnce(&mut ExportState)) {
    self.tx.send_modify(f);
  }

  /// Apply `f`; subscribers are only notified when it returns true.
  pub fn update_if(&self, f: impl FnOnce(&mut ExportState) -> bool) -> bool {
    self.tx.send_if_modified(f)
  }

  /// Raw receiver for callers that want to await changes themselves.
  pub fn watch(&self) -> watch::Receiver<ExportState> {
    self.tx.subscribe()
  }

  /// Call `listener` with the current state and after every change until
  /// the returned subscription is dropped or unsubscribed.
  ///
  /// Must be called from within a tokio runtime.
  pub fn subscribe<F>(&self, mut listener: F) -> Subscription
  where
    F: FnMut(&ExportState) + Send + 'static,
  {
    let mut rx = self.tx.subscribe();
    let task = tokio::spawn(async move {
      listener(&rx.borrow_and_update());
      while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        listener(&state);
      }
    });
    Subscription { task: Some(task) }
  }
}

impl Default for ExportStore {
  fn default() -> Self {
    Self::new()
  }
}

/// Handle returned by [`ExportStore::subscribe`].
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
  task: Option<JoinHandle<()>>,
}

impl Subscription {
  pub fn unsubscribe(mut self) {
    self.stop();
  }

  fn stop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.stop();
  }
}
