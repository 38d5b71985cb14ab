//! Retry-then-fail policy shared by repository reads/writes and export polling.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::ErrorClass;
use super::transport::TransportError;

/// Which failures are worth another attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryScope {
  /// Retry every failure regardless of status
  #[default]
  #[serde(alias = "all")]
  AllFailures,
  /// Retry only network failures and 5xx responses
  #[serde(alias = "transient")]
  TransientOnly,
}

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
  /// Try again after the given delay
  Retry(Duration),
  /// Surface the failure
  Fail,
}

/// Bounded retry policy: up to `attempts` extra tries after the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  attempts: u32,
  scope: RetryScope,
  delay: Duration,
}

impl RetryPolicy {
  pub fn new(attempts: u32) -> Self {
    Self {
      attempts,
      scope: RetryScope::AllFailures,
      delay: Duration::ZERO,
    }
  }

  /// Fail on the first error.
  pub fn none() -> Self {
    Self::new(0)
  }

  pub fn with_scope(mut self, scope: RetryScope) -> Self {
    self.scope = scope;
    self
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn attempts(&self) -> u32 {
    self.attempts
  }

  /// Decide whether a failure after `retries_done` retries gets another attempt.
  pub fn should_retry(&self, err: &TransportError, retries_done: u32) -> RetryDecision {
    if retries_done >= self.attempts {
      return RetryDecision::Fail;
    }
    let retryable = match self.scope {
      RetryScope::AllFailures => true,
      RetryScope::TransientOnly => ErrorClass::from_status(err.status).is_transient(),
    };
    if retryable {
      RetryDecision::Retry(self.delay)
    } else {
      RetryDecision::Fail
    }
  }

  /// Run `op` until it succeeds or the policy gives up; the last failure is returned.
  pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, TransportError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
  {
    let mut retries_done = 0;
    loop {
      match op().await {
        Ok(value) => {
          if retries_done > 0 {
            debug!(request = %label, retries = retries_done, "Request succeeded after retry");
          }
          return Ok(value);
        }
        Err(err) => match self.should_retry(&err, retries_done) {
          RetryDecision::Retry(delay) => {
            retries_done += 1;
            warn!(
              request = %label,
              status = err.status,
              attempt = retries_done,
              max_attempts = self.attempts,
              "Request failed, retrying"
            );
            if !delay.is_zero() {
              tokio::time::sleep(delay).await;
            }
          }
          RetryDecision::Fail => return Err(err),
        },
      }
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(3)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  async fn flaky(calls: &AtomicU32, failures: u32, status: u16) -> Result<&'static str, TransportError> {
    let n = calls.fetch_add(1, Ordering::SeqCst);
    if n < failures {
      Err(TransportError::status(status, None))
    } else {
      Ok("ok")
    }
  }

  #[tokio::test]
  async fn test_succeeds_on_last_allowed_attempt() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(3);
    let result = policy.run("GET /x", || flaky(&calls, 3, 500)).await;
    assert_eq!(result, Ok("ok"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn test_gives_up_after_budget() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(2);
    let result = policy.run("GET /x", || flaky(&calls, 10, 503)).await;
    assert_eq!(result.unwrap_err().status, 503);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_no_retry_policy_fails_fast() {
    let calls = AtomicU32::new(0);
    let result = RetryPolicy::none().run("GET /x", || flaky(&calls, 1, 0)).await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_transient_scope_skips_client_errors() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(3).with_scope(RetryScope::TransientOnly);
    let result = policy.run("POST /x", || flaky(&calls, 10, 409)).await;
    assert_eq!(result.unwrap_err().status, 409);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let calls = AtomicU32::new(0);
    let result = policy.run("GET /x", || flaky(&calls, 2, 0)).await;
    assert_eq!(result, Ok("ok"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_delay_between_attempts() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(1).with_delay(Duration::from_secs(2));
    let started = tokio::time::Instant::now();
    let result = policy.run("GET /x", || flaky(&calls, 1, 500)).await;
    assert_eq!(result, Ok("ok"));
    assert!(started.elapsed() >= Duration::from_secs(2));
  }
}
