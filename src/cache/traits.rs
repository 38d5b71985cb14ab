//! Core types for the caching system.

use serde_json::Value;
use tokio::time::Instant;

/// A stored response payload and when it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub payload: Value,
  pub stored_at: Instant,
}

impl CacheEntry {
  pub fn new(payload: Value) -> Self {
    Self {
      payload,
      stored_at: Instant::now(),
    }
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<Instant>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: Instant) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Create a result for a caller that joined another caller's request.
  pub fn joined(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Joined,
      cached_at: None,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched over the network by this caller
  Network,
  /// Served from a fresh cache entry
  Cache,
  /// Settled by an identical request that was already in flight
  Joined,
}
