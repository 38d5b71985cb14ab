//! Export job lifecycle: creation, status polling and the watchdog.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::RepositoryError;
use crate::config::ExportConfig;

use super::client::ExportJobClient;
use super::error::ExportError;
use super::session::{CancelSignal, PollingSession};
use super::state::{ExportState, ExportStore, Subscription};
use super::types::{ExportCategory, ExportJob, ExportStatus, ExportedFile, JobStatus};

const JOB_FAILED: &str = "Export failed. Please try again.";
const STATUS_CHECK_FAILED: &str = "Failed to check export status.";
const JOB_TIMED_OUT: &str = "Export is taking longer than expected. Please check back later.";

/// Export state and timers owned by one consumer, e.g. one open panel.
///
/// Tearing the consumer down (explicitly or by dropping it) aborts an
/// in-flight creation request and stops the polling session.
pub struct ExportConsumer {
  store: ExportStore,
  session: Mutex<Option<PollingSession>>,
  teardown: CancelSignal,
}

impl ExportConsumer {
  pub fn new() -> Self {
    Self {
      store: ExportStore::new(),
      session: Mutex::new(None),
      teardown: CancelSignal::new(),
    }
  }

  pub fn store(&self) -> &ExportStore {
    &self.store
  }

  pub fn state(&self) -> ExportState {
    self.store.snapshot()
  }

  pub fn subscribe<F>(&self, listener: F) -> Subscription
  where
    F: FnMut(&ExportState) + Send + 'static,
  {
    self.store.subscribe(listener)
  }

  /// A poll loop or watchdog is still running.
  pub fn has_active_session(&self) -> bool {
    self
      .lock_session()
      .as_ref()
      .is_some_and(|session| !session.is_finished())
  }

  pub fn is_torn_down(&self) -> bool {
    self.teardown.is_cancelled()
  }

  /// Cancel in-flight calls, the poll loop and the watchdog at once.
  pub fn teardown(&self) {
    self.teardown.cancel();
    self.cancel_session();
  }

  /// Wait until no creation request is in flight and no job is pending or
  /// processing, then report how the last export ended.
  pub async fn settled(&self) -> Result<ExportState, ExportError> {
    let mut rx = self.store.watch();
    let settled = tokio::select! {
      biased;
      _ = self.teardown.cancelled() => None,
      result = rx.wait_for(|s| !s.loading && !s.is_in_progress()) => {
        result.ok().map(|state| state.clone())
      }
    };

    let state = settled.ok_or(ExportError::TornDown)?;
    match state.current_status {
      Some(ExportStatus::Failed) => Err(ExportError::JobFailure(
        state.error.clone().unwrap_or_else(|| JOB_FAILED.to_string()),
      )),
      Some(ExportStatus::Timeout) => Err(ExportError::JobTimeout),
      _ => Ok(state),
    }
  }

  fn lock_session(&self) -> MutexGuard<'_, Option<PollingSession>> {
    self
      .session
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Replace the current session; the previous one is cancelled on drop.
  fn attach(&self, session: PollingSession) {
    let previous = self.lock_session().replace(session);
    drop(previous);
  }

  fn cancel_session(&self) {
    if let Some(session) = self.lock_session().take() {
      debug!(job_id = %session.job_id(), "Cancelling polling session");
      session.cancel();
    }
  }
}

impl Default for ExportConsumer {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for ExportConsumer {
  fn drop(&mut self) {
    self.teardown();
  }
}

/// Drives export jobs for any number of consumers.
#[derive(Clone)]
pub struct ExportOrchestrator {
  client: ExportJobClient,
  poll_interval: Duration,
  watchdog_timeout: Duration,
}

impl ExportOrchestrator {
  pub fn new(client: ExportJobClient) -> Self {
    Self {
      client,
      poll_interval: Duration::from_secs(2),
      watchdog_timeout: Duration::from_secs(5 * 60),
    }
  }

  pub fn from_config(client: ExportJobClient, config: &ExportConfig) -> Self {
    Self::new(client.with_poll_retry(config.poll_retry()))
      .with_timing(config.poll_interval(), config.watchdog_timeout())
  }

  pub fn with_timing(mut self, poll_interval: Duration, watchdog_timeout: Duration) -> Self {
    self.poll_interval = poll_interval;
    self.watchdog_timeout = watchdog_timeout;
    self
  }

  pub fn client(&self) -> &ExportJobClient {
    &self.client
  }

  /// Request a new export and start following it.
  ///
  /// Any session still attached to `consumer` is cancelled first. Returns the
  /// new job id once the job exists; its progress is reported through the
  /// consumer's state.
  pub async fn initiate_export(
    &self,
    category: ExportCategory,
    consumer: &ExportConsumer,
  ) -> Result<String, ExportError> {
    if consumer.is_torn_down() {
      return Err(ExportError::TornDown);
    }

    consumer.cancel_session();
    consumer.store.update(|s| {
      s.loading = true;
      s.error = None;
      s.current_job_id = None;
      s.current_status = None;
    });

    info!(category = %category, "Requesting export");
    let requested = tokio::select! {
      biased;
      _ = consumer.teardown.cancelled() => {
        consumer.store.update(|s| s.loading = false);
        return Err(ExportError::TornDown);
      }
      result = self.client.request_export(category) => result,
    };

    let ticket = match requested {
      Ok(ticket) => ticket,
      Err(err) => {
        consumer.store.update(|s| {
          s.loading = false;
          s.error = Some(format!(
            "Failed to request {} export. Please try again.",
            category.slug()
          ));
        });
        return Err(err.into());
      }
    };

    let job_id = ticket.job_id;
    consumer.store.update(|s| {
      s.loading = false;
      s.current_job_id = Some(job_id.clone());
      s.current_status = Some(ExportStatus::Pending);
    });
    info!(category = %category, job_id = %job_id, "Export job started");

    consumer.attach(self.start_session(&job_id, category, consumer.store.clone()));
    Ok(job_id)
  }

  /// Replace the consumer's file list with the completed exports of
  /// `category`, in backend order. Returns the number of files.
  pub async fn load_existing_export_jobs(
    &self,
    category: ExportCategory,
    consumer: &ExportConsumer,
  ) -> Result<usize, ExportError> {
    let listed = tokio::select! {
      biased;
      _ = consumer.teardown.cancelled() => return Err(ExportError::TornDown),
      result = self.client.list_jobs() => result,
    };

    match listed {
      Ok(jobs) => {
        let files: Vec<ExportedFile> = jobs
          .iter()
          .filter(|job| job.category == category)
          .filter_map(ExportedFile::from_job)
          .collect();
        let count = files.len();
        consumer.store.update(|s| {
          s.exported_files = files;
          s.load_error = None;
        });
        debug!(category = %category, count, "Loaded existing exports");
        Ok(count)
      }
      Err(err) => {
        consumer.store.update(|s| {
          s.load_error = Some(format!("Failed to load {} exports.", category.slug()));
        });
        Err(err.into())
      }
    }
  }

  /// Fetch a completed export file.
  pub async fn download_export(&self, job_id: &str) -> Result<Vec<u8>, ExportError> {
    Ok(self.client.download(job_id).await?)
  }

  fn start_session(&self, job_id: &str, category: ExportCategory, store: ExportStore) -> PollingSession {
    let signal = CancelSignal::new();
    let watcher = JobWatcher {
      client: self.client.clone(),
      job_id: job_id.to_string(),
      category,
      store,
      signal: signal.clone(),
    };

    let poll = tokio::spawn(watcher.clone().poll(self.poll_interval));
    let watchdog = tokio::spawn(watcher.watchdog(self.watchdog_timeout));
    PollingSession::new(job_id, signal, poll, watchdog)
  }
}

/// Whether the poll loop keeps going after applying a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
  Continue,
  Stop,
}

/// State shared by the two tasks of one session.
#[derive(Clone)]
struct JobWatcher {
  client: ExportJobClient,
  job_id: String,
  category: ExportCategory,
  store: ExportStore,
  signal: CancelSignal,
}

impl JobWatcher {
  /// Poll every `every`, starting one interval from now. Requests are not
  /// serialized; a response older than the last applied one is dropped.
  async fn poll(self, every: Duration) {
    let mut ticks = interval_at(Instant::now() + every, every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight = FuturesUnordered::new();
    let mut generation: u64 = 0;
    let mut applied: u64 = 0;

    loop {
      tokio::select! {
        biased;
        _ = self.signal.cancelled() => break,
        Some((polled, result)) = in_flight.next(), if !in_flight.is_empty() => {
          if polled <= applied {
            warn!(job_id = %self.job_id, generation = polled, applied, "Discarding stale export status");
            continue;
          }
          applied = polled;
          if self.apply(result) == Flow::Stop {
            self.signal.cancel();
            break;
          }
        }
        _ = ticks.tick() => {
          generation += 1;
          let client = self.client.clone();
          let job_id = self.job_id.clone();
          let polled = generation;
          in_flight.push(async move { (polled, client.job_status(&job_id).await) });
        }
      }
    }
  }

  /// Force `TIMEOUT` if the job is still pending or processing after `timeout`.
  async fn watchdog(self, timeout: Duration) {
    tokio::select! {
      biased;
      _ = self.signal.cancelled() => {}
      _ = tokio::time::sleep(timeout) => {
        let timed_out = self.write(|s| {
          s.current_status = Some(ExportStatus::Timeout);
          s.error = Some(JOB_TIMED_OUT.to_string());
        });
        if timed_out {
          warn!(job_id = %self.job_id, after = ?timeout, "Export timed out");
        }
        self.signal.cancel();
      }
    }
  }

  fn apply(&self, result: Result<ExportJob, RepositoryError>) -> Flow {
    let job = match result {
      Ok(job) => job,
      Err(err) => {
        warn!(job_id = %self.job_id, error = %err, "Export status check failed");
        self.write(|s| {
          s.current_status = Some(ExportStatus::Failed);
          s.error = Some(STATUS_CHECK_FAILED.to_string());
        });
        return Flow::Stop;
      }
    };

    match job.status {
      JobStatus::Pending | JobStatus::Processing => {
        self.write(|s| s.current_status = Some(job.status.into()));
        Flow::Continue
      }
      JobStatus::Completed => {
        match job.file_url {
          Some(file_url) => {
            let file = ExportedFile::new(job.id, self.category, file_url, Utc::now());
            info!(job_id = %self.job_id, file = %file.file_name, "Export completed");
            self.write(|s| {
              s.exported_files.insert(0, file);
              s.current_job_id = None;
              s.current_status = None;
            });
          }
          None => {
            warn!(job_id = %self.job_id, "Export completed without a file");
            self.write(|s| s.current_status = Some(ExportStatus::Completed));
          }
        }
        Flow::Stop
      }
      JobStatus::Failed => {
        let message = job.error_message.unwrap_or_else(|| JOB_FAILED.to_string());
        info!(job_id = %self.job_id, error = %message, "Export failed");
        self.write(|s| {
          s.current_status = Some(ExportStatus::Failed);
          s.error = Some(message);
        });
        Flow::Stop
      }
    }
  }

  /// Apply `f` only while the store still follows this job and the job is
  /// pending or processing. Returns whether it was applied.
  fn write(&self, f: impl FnOnce(&mut ExportState)) -> bool {
    self.store.update_if(|s| {
      let live = s.tracks(&self.job_id) && s.is_in_progress();
      if live {
        f(s);
      }
      live
    })
  }
}
