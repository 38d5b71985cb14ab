//! Scripted transport used by unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{ApiRequest, ApiResponse, Method, Transport, TransportError};

pub(crate) const BASE_URL: &str = "http://api.test/v1";

#[derive(Clone)]
struct Scripted {
  outcome: Result<ApiResponse, TransportError>,
  delay: Duration,
}

/// Replays queued outcomes per `(method, url)`. The last queued outcome of a
/// route repeats forever.
pub(crate) struct ScriptedTransport {
  routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
  calls: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      routes: Mutex::new(HashMap::new()),
      calls: Mutex::new(Vec::new()),
    })
  }

  pub fn url(path: &str) -> String {
    format!("{}/{}", BASE_URL, path)
  }

  fn push(&self, method: Method, path: &str, scripted: Scripted) {
    self
      .routes
      .lock()
      .unwrap()
      .entry((method, Self::url(path)))
      .or_default()
      .push_back(scripted);
  }

  pub fn respond(&self, method: Method, path: &str, body: Value) {
    self.respond_after(method, path, body, Duration::ZERO);
  }

  pub fn respond_after(&self, method: Method, path: &str, body: Value, delay: Duration) {
    let bytes = serde_json::to_vec(&body).unwrap();
    self.push(
      method,
      path,
      Scripted {
        outcome: Ok(ApiResponse::new(200, bytes)),
        delay,
      },
    );
  }

  pub fn respond_raw(&self, method: Method, path: &str, bytes: &[u8]) {
    self.push(
      method,
      path,
      Scripted {
        outcome: Ok(ApiResponse::new(200, bytes.to_vec())),
        delay: Duration::ZERO,
      },
    );
  }

  pub fn fail(&self, method: Method, path: &str, status: u16) {
    self.fail_with(method, path, status, None);
  }

  pub fn fail_with(&self, method: Method, path: &str, status: u16, body: Option<Value>) {
    let outcome = if status == 0 {
      TransportError::network("connection refused")
    } else {
      TransportError::status(status, body)
    };
    self.push(
      method,
      path,
      Scripted {
        outcome: Err(outcome),
        delay: Duration::ZERO,
      },
    );
  }

  /// Number of calls made to one route.
  pub fn calls(&self, method: Method, path: &str) -> usize {
    let url = Self::url(path);
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.method == method && r.url == url)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  fn base_url(&self) -> &str {
    BASE_URL
  }

  async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
    let key = (request.method, request.url.clone());
    self.calls.lock().unwrap().push(request);

    let scripted = {
      let mut routes = self.routes.lock().unwrap();
      match routes.get_mut(&key) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
      }
    };

    match scripted {
      Some(scripted) => {
        if !scripted.delay.is_zero() {
          tokio::time::sleep(scripted.delay).await;
        }
        scripted.outcome
      }
      None => Err(TransportError::status(404, None)),
    }
  }
}
