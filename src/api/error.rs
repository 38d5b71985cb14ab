//! Normalized errors surfaced by the data layer.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::transport::{Method, TransportError};

/// Semantic classification of a failed call, derived from the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Network,
  InvalidRequest,
  AuthenticationRequired,
  AccessDenied,
  NotFound,
  Conflict,
  ValidationFailed,
  ServerError,
  Unavailable,
  Unknown,
}

impl ErrorKind {
  pub fn from_status(status: u16) -> Self {
    match status {
      0 => ErrorKind::Network,
      400 => ErrorKind::InvalidRequest,
      401 => ErrorKind::AuthenticationRequired,
      403 => ErrorKind::AccessDenied,
      404 => ErrorKind::NotFound,
      409 => ErrorKind::Conflict,
      422 => ErrorKind::ValidationFailed,
      500 => ErrorKind::ServerError,
      503 => ErrorKind::Unavailable,
      _ => ErrorKind::Unknown,
    }
  }

  /// Default user-facing message for this kind.
  pub fn default_message(&self, entity_name: &str) -> String {
    match self {
      ErrorKind::Network => "Network error. Please check your connection.".to_string(),
      ErrorKind::InvalidRequest => "Invalid request. Please check your input.".to_string(),
      ErrorKind::AuthenticationRequired => "Authentication required. Please log in.".to_string(),
      ErrorKind::AccessDenied => "Access denied. You do not have permission.".to_string(),
      ErrorKind::NotFound => format!("{} not found.", entity_name),
      ErrorKind::Conflict => "Conflict. The resource already exists or is in use.".to_string(),
      ErrorKind::ValidationFailed => "Validation error. Please check your input.".to_string(),
      ErrorKind::ServerError => "Server error. Please try again later.".to_string(),
      ErrorKind::Unavailable => "Service unavailable. Please try again later.".to_string(),
      ErrorKind::Unknown => format!(
        "An error occurred while processing {}.",
        entity_name
      ),
    }
  }
}

/// Coarse error class used by retry decisions and callers that only care
/// about who is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// No response was received
  Network,
  /// 4xx
  Client,
  /// 5xx
  Server,
  Other,
}

impl ErrorClass {
  pub fn from_status(status: u16) -> Self {
    match status {
      0 => ErrorClass::Network,
      400..=499 => ErrorClass::Client,
      500..=599 => ErrorClass::Server,
      _ => ErrorClass::Other,
    }
  }

  /// Network and server failures may succeed on a later attempt.
  pub fn is_transient(&self) -> bool {
    matches!(self, ErrorClass::Network | ErrorClass::Server)
  }
}

/// Error returned by every repository and export client call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} [{status} {path}]")]
pub struct RepositoryError {
  pub kind: ErrorKind,
  pub message: String,
  /// HTTP status, 0 for network failures
  pub status: u16,
  pub timestamp: DateTime<Utc>,
  /// Full URL of the failed request
  pub path: String,
  /// Error body sent by the server, if any
  pub details: Option<Value>,
}

impl RepositoryError {
  /// Normalize a transport failure. The server's own `message` field wins
  /// over the per-status default.
  pub fn from_transport(err: TransportError, url: &str, entity_name: &str) -> Self {
    let kind = ErrorKind::from_status(err.status);
    let message = err
      .body
      .as_ref()
      .and_then(|body| body.get("message"))
      .and_then(Value::as_str)
      .map(String::from)
      .unwrap_or_else(|| kind.default_message(entity_name));

    Self {
      kind,
      message,
      status: err.status,
      timestamp: Utc::now(),
      path: url.to_string(),
      details: err.body,
    }
  }

  /// A 2xx response whose body could not be decoded.
  pub fn decode(status: u16, url: &str, entity_name: &str, err: serde_json::Error) -> Self {
    Self {
      kind: ErrorKind::Unknown,
      message: format!("Failed to decode {} response: {}", entity_name, err),
      status,
      timestamp: Utc::now(),
      path: url.to_string(),
      details: None,
    }
  }

  pub fn class(&self) -> ErrorClass {
    ErrorClass::from_status(self.status)
  }

  /// Log a surfaced error with the request that produced it.
  pub(crate) fn report(self, method: Method) -> Self {
    tracing::error!(
      method = %method,
      path = %self.path,
      status = self.status,
      kind = ?self.kind,
      "Repository error: {}",
      self.message
    );
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_status_mapping() {
    assert_eq!(ErrorKind::from_status(0), ErrorKind::Network);
    assert_eq!(ErrorKind::from_status(400), ErrorKind::InvalidRequest);
    assert_eq!(ErrorKind::from_status(401), ErrorKind::AuthenticationRequired);
    assert_eq!(ErrorKind::from_status(403), ErrorKind::AccessDenied);
    assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
    assert_eq!(ErrorKind::from_status(409), ErrorKind::Conflict);
    assert_eq!(ErrorKind::from_status(422), ErrorKind::ValidationFailed);
    assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
    assert_eq!(ErrorKind::from_status(503), ErrorKind::Unavailable);
    assert_eq!(ErrorKind::from_status(418), ErrorKind::Unknown);
    assert_eq!(ErrorKind::from_status(502), ErrorKind::Unknown);
  }

  #[test]
  fn test_error_class() {
    assert!(ErrorClass::from_status(0).is_transient());
    assert!(ErrorClass::from_status(502).is_transient());
    assert!(!ErrorClass::from_status(409).is_transient());
    assert_eq!(ErrorClass::from_status(302), ErrorClass::Other);
  }

  #[test]
  fn test_default_message_names_entity() {
    let err = RepositoryError::from_transport(
      TransportError::status(404, None),
      "http://api/inventory/warehouses/9",
      "Warehouse",
    );
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.message, "Warehouse not found.");
    assert_eq!(err.path, "http://api/inventory/warehouses/9");
    assert!(err.details.is_none());
  }

  #[test]
  fn test_server_message_wins() {
    let body = json!({ "message": "Code already in use", "status": 409 });
    let err = RepositoryError::from_transport(
      TransportError::status(409, Some(body.clone())),
      "http://api/inventory/products",
      "Product",
    );
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "Code already in use");
    assert_eq!(err.details, Some(body));
  }

  #[test]
  fn test_network_failure() {
    let err = RepositoryError::from_transport(
      TransportError::network("connection refused"),
      "http://api/inventory/stocks",
      "Stock",
    );
    assert_eq!(err.status, 0);
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.class(), ErrorClass::Network);
  }
}
