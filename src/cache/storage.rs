//! Cache storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::CacheEntry;

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Look up an entry by key.
  fn get(&self, key: &str) -> Option<CacheEntry>;

  /// Store an entry, replacing any previous one.
  fn put(&self, key: String, entry: CacheEntry);

  /// Drop every entry.
  fn clear(&self);

  /// Number of stored entries.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Option<CacheEntry> {
    None // Always miss
  }

  fn put(&self, _key: String, _entry: CacheEntry) {
    // Discard
  }

  fn clear(&self) {}

  fn len(&self) -> usize {
    0
  }
}

/// Process-local storage backed by a hash map.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    // A panic while holding the lock cannot leave the map half-written
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Option<CacheEntry> {
    self.entries().get(key).cloned()
  }

  fn put(&self, key: String, entry: CacheEntry) {
    self.entries().insert(key, entry);
  }

  fn clear(&self) {
    self.entries().clear();
  }

  fn len(&self) -> usize {
    self.entries().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_memory_storage_round_trip() {
    let storage = MemoryStorage::new();
    assert!(storage.is_empty());

    storage.put("k".to_string(), CacheEntry::new(json!([1, 2])));
    assert_eq!(storage.get("k").map(|e| e.payload), Some(json!([1, 2])));
    assert_eq!(storage.len(), 1);

    storage.clear();
    assert!(storage.get("k").is_none());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.put("k".to_string(), CacheEntry::new(json!({})));
    assert!(storage.get("k").is_none());
    assert!(storage.is_empty());
  }
}
