//! Process-wide count of in-flight foreground requests.
//!
//! Every foreground request takes an [`ActivityGuard`] when it starts and
//! releases it when it settles (success, failure or cancellation). Observers
//! read the current count or subscribe to the derived "is loading" flag.
//! Background traffic such as export status polling does not take a guard.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared in-flight request counter.
#[derive(Clone)]
pub struct ActivityTracker {
  inner: Arc<ActivityInner>,
}

struct ActivityInner {
  active: AtomicUsize,
  loading: watch::Sender<bool>,
}

impl ActivityTracker {
  pub fn new() -> Self {
    let (loading, _) = watch::channel(false);
    Self {
      inner: Arc::new(ActivityInner {
        active: AtomicUsize::new(0),
        loading,
      }),
    }
  }

  /// Record the start of a request. The returned guard records its end on drop.
  pub fn begin(&self) -> ActivityGuard {
    let now = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.inner.loading.send_replace(now > 0);
    ActivityGuard {
      inner: Arc::clone(&self.inner),
    }
  }

  /// Number of requests currently in flight.
  pub fn active_requests(&self) -> usize {
    self.inner.active.load(Ordering::SeqCst)
  }

  pub fn is_loading(&self) -> bool {
    self.active_requests() > 0
  }

  /// Watch the loading flag. Dropping the receiver unsubscribes.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.inner.loading.subscribe()
  }
}

impl Default for ActivityTracker {
  fn default() -> Self {
    Self::new()
  }
}

/// Marks one in-flight request; decrements the counter when dropped.
#[must_use = "the request is only counted while the guard is alive"]
pub struct ActivityGuard {
  inner: Arc<ActivityInner>,
}

impl Drop for ActivityGuard {
  fn drop(&mut self) {
    let now = self.inner.active.fetch_sub(1, Ordering::SeqCst) - 1;
    self.inner.loading.send_replace(now > 0);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_counts_nested_requests() {
    let tracker = ActivityTracker::new();
    assert!(!tracker.is_loading());

    let first = tracker.begin();
    let second = tracker.begin();
    assert_eq!(tracker.active_requests(), 2);

    drop(first);
    assert!(tracker.is_loading());

    drop(second);
    assert_eq!(tracker.active_requests(), 0);
    assert!(!tracker.is_loading());
  }

  #[test]
  fn test_subscriber_sees_loading_flag() {
    let tracker = ActivityTracker::new();
    let rx = tracker.subscribe();
    assert!(!*rx.borrow());

    let guard = tracker.begin();
    assert!(*rx.borrow());

    drop(guard);
    assert!(!*rx.borrow());
  }

  #[test]
  fn test_clones_share_the_counter() {
    let tracker = ActivityTracker::new();
    let other = tracker.clone();
    let _guard = other.begin();
    assert_eq!(tracker.active_requests(), 1);
  }
}
