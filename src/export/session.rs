//! Cancellable timer tasks backing one export job.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One-shot cancellation flag shared between a session's owner and its tasks.
#[derive(Clone)]
pub struct CancelSignal {
  tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
  pub fn new() -> Self {
    let (tx, _) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.tx.borrow()
  }

  /// Resolves once `cancel` has been called.
  pub async fn cancelled(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives in `self`, so this only returns once the flag is set
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}

impl Default for CancelSignal {
  fn default() -> Self {
    Self::new()
  }
}

/// The poll loop and watchdog of one job, stopped together.
///
/// Either task may end the session from the inside through the shared
/// [`CancelSignal`]; the owner ends it with [`PollingSession::cancel`], which
/// also aborts both tasks so in-flight status requests are dropped.
pub struct PollingSession {
  job_id: String,
  signal: CancelSignal,
  poll: JoinHandle<()>,
  watchdog: JoinHandle<()>,
}

impl PollingSession {
  pub fn new(job_id: impl Into<String>, signal: CancelSignal, poll: JoinHandle<()>, watchdog: JoinHandle<()>) -> Self {
    Self {
      job_id: job_id.into(),
      signal,
      poll,
      watchdog,
    }
  }

  pub fn job_id(&self) -> &str {
    &self.job_id
  }

  pub fn cancel(&self) {
    self.signal.cancel();
    self.poll.abort();
    self.watchdog.abort();
  }

  /// Both tasks have exited.
  pub fn is_finished(&self) -> bool {
    self.poll.is_finished() && self.watchdog.is_finished()
  }
}

impl Drop for PollingSession {
  fn drop(&mut self) {
    self.cancel();
  }
}
