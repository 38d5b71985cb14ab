//! The seam between the data layer and the network.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// HTTP verbs used by the inventory API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Absolute URL without the query string
  pub url: String,
  /// Query pairs in send order (repeated names allowed)
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
  /// Background requests are not counted as user-visible activity
  pub background: bool,
}

impl ApiRequest {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      query: Vec::new(),
      body: None,
      background: false,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
    self.query = query;
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn in_background(mut self) -> Self {
    self.background = true;
    self
  }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl ApiResponse {
  pub fn new(status: u16, body: Vec<u8>) -> Self {
    Self { status, body }
  }

  /// Decode the body as JSON. An empty body decodes as `null`.
  pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
    if self.body.is_empty() {
      serde_json::from_value(Value::Null)
    } else {
      serde_json::from_slice(&self.body)
    }
  }
}

/// A failed request. `status` is 0 when no response was received.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct TransportError {
  pub status: u16,
  pub message: String,
  /// Parsed error body, when the server sent JSON
  pub body: Option<Value>,
}

impl TransportError {
  pub fn network(message: impl Into<String>) -> Self {
    Self {
      status: 0,
      message: message.into(),
      body: None,
    }
  }

  pub fn status(status: u16, body: Option<Value>) -> Self {
    Self {
      status,
      message: format!("HTTP {}", status),
      body,
    }
  }
}

/// Performs HTTP calls on behalf of the data layer.
#[async_trait]
pub trait Transport: Send + Sync {
  /// API origin that resource paths are resolved against.
  fn base_url(&self) -> &str;

  /// Execute one request. Non-2xx responses are returned as errors.
  async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

  /// Resolve a resource path (e.g. `inventory/warehouses/7`) against the API origin.
  fn resolve(&self, path: &str) -> String {
    let base = self.base_url().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
      base.to_string()
    } else {
      format!("{}/{}", base, path)
    }
  }
}
