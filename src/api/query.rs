//! Query parameters and the request signature used as cache key.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

/// Query parameters, kept sorted by name so serialization is deterministic.
///
/// A name may carry several values; they are sent as repeated pairs
/// (`?tag=a&tag=b`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set a single-valued parameter, replacing earlier values.
  pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.0.insert(name.into(), vec![value.to_string()]);
    self
  }

  /// Set a multi-valued parameter.
  pub fn with_all<I, V>(mut self, name: impl Into<String>, values: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: ToString,
  {
    self
      .0
      .insert(name.into(), values.into_iter().map(|v| v.to_string()).collect());
    self
  }

  /// Merge `other` into `self`; entries of `other` win.
  pub fn merged(mut self, other: Option<&QueryParams>) -> Self {
    if let Some(other) = other {
      for (name, values) in &other.0 {
        self.0.insert(name.clone(), values.clone());
      }
    }
    self
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Flatten into query pairs in send order.
  pub fn to_pairs(&self) -> Vec<(String, String)> {
    self
      .0
      .iter()
      .flat_map(|(name, values)| values.iter().map(move |v| (name.clone(), v.clone())))
      .collect()
  }

  fn canonical(&self) -> String {
    if self.is_empty() {
      String::new()
    } else {
      serde_json::to_string(&self.0).unwrap_or_default()
    }
  }
}

/// Percent-encode one path segment so ids and codes containing `/`, `?`,
/// `#` or `%` stay inside their segment.
pub fn path_segment(segment: &str) -> String {
  match segment {
    "." => return "%2E".to_string(),
    ".." => return "%2E%2E".to_string(),
    _ => {}
  }

  let mut url = match Url::parse("http://segment.invalid/") {
    Ok(url) => url,
    Err(_) => return segment.to_string(),
  };
  if let Ok(mut segments) = url.path_segments_mut() {
    segments.clear().push(segment);
  }
  url.path().trim_start_matches('/').to_string()
}

/// Signature of a read request: full URL plus canonical parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  pub url: String,
  pub params: QueryParams,
}

impl RequestKey {
  pub fn new(url: impl Into<String>, params: QueryParams) -> Self {
    Self {
      url: url.into(),
      params,
    }
  }

  /// Stable, fixed-length cache key.
  pub fn cache_hash(&self) -> String {
    let input = format!("{}:{}", self.url, self.params.canonical());

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    if self.params.is_empty() {
      self.url.clone()
    } else {
      format!("{}?{}", self.url, self.params.canonical())
    }
  }
}
