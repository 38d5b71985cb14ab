//! Cache layer that orchestrates caching logic with network fetching.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::api::RequestKey;

use super::storage::CacheStorage;
use super::traits::{CacheEntry, CacheResult};

type SharedFetch<E> = Shared<BoxFuture<'static, Result<Value, E>>>;
type InFlightMap<E> = HashMap<String, InFlight<E>>;

/// A network fetch that other callers of the same key can join.
struct InFlight<E> {
  id: u64,
  fetch: SharedFetch<E>,
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between a repository and the transport, providing
/// time-based freshness, coarse invalidation and de-duplication of
/// identical concurrent reads.
pub struct CacheLayer<E> {
  storage: Arc<dyn CacheStorage>,
  /// How long a stored payload is served without a network call
  ttl: Duration,
  /// Bumped on every invalidation; fetches started under an older epoch
  /// must not repopulate the cache
  epoch: Arc<AtomicU64>,
  next_fetch_id: Arc<AtomicU64>,
  in_flight: Arc<Mutex<InFlightMap<E>>>,
}

impl<E> CacheLayer<E>
where
  E: Clone + Send + Sync + 'static,
{
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      ttl: Duration::from_secs(5 * 60),
      epoch: Arc::new(AtomicU64::new(0)),
      next_fetch_id: Arc::new(AtomicU64::new(0)),
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Set how long cached data is served.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  fn is_fresh(&self, entry: &CacheEntry) -> bool {
    entry.stored_at.elapsed() < self.ttl
  }

  /// Fetch with cache-aside semantics.
  ///
  /// 1. A fresh entry for `key` is returned without calling `fetcher`
  /// 2. An identical fetch already in flight is joined
  /// 3. Otherwise `fetcher` runs; a success is stored unless the cache was
  ///    invalidated while it ran
  pub async fn fetch<F, Fut>(&self, key: &RequestKey, fetcher: F) -> Result<CacheResult<Value>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
  {
    let hash = key.cache_hash();

    if let Some(entry) = self.storage.get(&hash) {
      if self.is_fresh(&entry) {
        debug!(key = %key.description(), "Cache hit");
        return Ok(CacheResult::from_cache(entry.payload, entry.stored_at));
      }
    }

    // Futures are lazy: building one here costs nothing if we end up joining
    let request = fetcher();

    let (fetch, joined) = {
      let mut in_flight = lock(&self.in_flight);
      match in_flight.get(&hash) {
        Some(existing) => (existing.fetch.clone(), true),
        None => {
          let id = self.next_fetch_id.fetch_add(1, Ordering::SeqCst);
          let fetch = self.spawn_fetch(id, hash.clone(), request);
          in_flight.insert(
            hash.clone(),
            InFlight {
              id,
              fetch: fetch.clone(),
            },
          );
          (fetch, false)
        }
      }
    };

    if joined {
      debug!(key = %key.description(), "Joining in-flight request");
      fetch.await.map(CacheResult::joined)
    } else {
      debug!(key = %key.description(), "Cache miss");
      fetch.await.map(CacheResult::from_network)
    }
  }

  fn spawn_fetch<Fut>(&self, id: u64, hash: String, request: Fut) -> SharedFetch<E>
  where
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
  {
    let storage = Arc::clone(&self.storage);
    let epoch = Arc::clone(&self.epoch);
    let started_epoch = epoch.load(Ordering::SeqCst);
    let in_flight = Arc::clone(&self.in_flight);

    async move {
      let result = request.await;

      if let Ok(payload) = &result {
        if epoch.load(Ordering::SeqCst) == started_epoch {
          storage.put(hash.clone(), CacheEntry::new(payload.clone()));
        }
      }

      let mut in_flight = lock(&in_flight);
      if in_flight.get(&hash).map(|f| f.id) == Some(id) {
        in_flight.remove(&hash);
      }

      result
    }
    .boxed()
    .shared()
  }

  /// Drop every cached payload. Fetches still in flight complete for their
  /// callers but are neither joined nor stored afterwards.
  pub fn invalidate_all(&self) {
    self.epoch.fetch_add(1, Ordering::SeqCst);
    self.storage.clear();
    lock(&self.in_flight).clear();
  }

  /// Number of stored payloads.
  pub fn len(&self) -> usize {
    self.storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.storage.is_empty()
  }
}

impl<E> Clone for CacheLayer<E> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      ttl: self.ttl,
      epoch: Arc::clone(&self.epoch),
      next_fetch_id: Arc::clone(&self.next_fetch_id),
      in_flight: Arc::clone(&self.in_flight),
    }
  }
}

fn lock<E>(in_flight: &Mutex<InFlightMap<E>>) -> MutexGuard<'_, InFlightMap<E>> {
  in_flight
    .lock()
    .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::QueryParams;
  use crate::cache::{CacheSource, MemoryStorage, NoopStorage};
  use serde_json::json;
  use std::sync::atomic::AtomicUsize;

  fn key(url: &str) -> RequestKey {
    RequestKey::new(url, QueryParams::new())
  }

  fn counted(
    calls: &Arc<AtomicUsize>,
    payload: Value,
  ) -> impl Future<Output = Result<Value, String>> + Send + 'static {
    let calls = Arc::clone(calls);
    async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(10)).await;
      Ok(payload)
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_entry_skips_fetch() {
    let cache: CacheLayer<String> = CacheLayer::new(MemoryStorage::new()).with_ttl(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache.fetch(&key("/a"), || counted(&calls, json!(1))).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    tokio::time::advance(Duration::from_secs(59)).await;
    let second = cache.fetch(&key("/a"), || counted(&calls, json!(2))).await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, json!(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_refetches() {
    let cache: CacheLayer<String> = CacheLayer::new(MemoryStorage::new()).with_ttl(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    cache.fetch(&key("/a"), || counted(&calls, json!(1))).await.unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;
    let again = cache.fetch(&key("/a"), || counted(&calls, json!(2))).await.unwrap();

    assert_eq!(again.source, CacheSource::Network);
    assert_eq!(again.data, json!(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_reads_share_one_fetch() {
    let cache: CacheLayer<String> = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicUsize::new(0));

    let k = key("/a");
    let (a, b) = tokio::join!(
      cache.fetch(&k, || counted(&calls, json!("x"))),
      cache.fetch(&k, || counted(&calls, json!("y"))),
    );

    assert_eq!(a.unwrap().data, json!("x"));
    let b = b.unwrap();
    assert_eq!(b.data, json!("x"));
    assert_eq!(b.source, CacheSource::Joined);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Nothing is cached with the no-op backend, so a later read fetches again
    cache.fetch(&k, || counted(&calls, json!("z"))).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failures_are_shared_and_not_cached() {
    let cache: CacheLayer<String> = CacheLayer::new(MemoryStorage::new());
    let result = cache
      .fetch(&key("/a"), || async { Err::<Value, _>("boom".to_string()) })
      .await;
    assert_eq!(result.unwrap_err(), "boom");
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidation_during_fetch_is_not_stored() {
    let cache: CacheLayer<String> = CacheLayer::new(MemoryStorage::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let k = key("/a");
    let pending = cache.fetch(&k, || counted(&calls, json!(1)));
    let invalidate = async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      cache.invalidate_all();
    };
    let (result, _) = tokio::join!(pending, invalidate);

    assert_eq!(result.unwrap().data, json!(1));
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_all_clears_every_key() {
    let cache: CacheLayer<String> = CacheLayer::new(MemoryStorage::new());
    let calls = Arc::new(AtomicUsize::new(0));

    cache.fetch(&key("/a"), || counted(&calls, json!(1))).await.unwrap();
    cache.fetch(&key("/b"), || counted(&calls, json!(2))).await.unwrap();
    assert_eq!(cache.len(), 2);

    cache.invalidate_all();
    assert!(cache.is_empty());

    let again = cache.fetch(&key("/a"), || counted(&calls, json!(3))).await.unwrap();
    assert_eq!(again.source, CacheSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }
}
