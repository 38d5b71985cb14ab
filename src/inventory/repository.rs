//! Generic cache-aside CRUD repository.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::api::{
  path_segment, ApiRequest, ApiResponse, ErrorKind, Method, QueryParams, RepositoryError,
  RequestKey, RetryPolicy, RetryScope, Transport,
};
use crate::cache::{CacheLayer, MemoryStorage, NoopStorage};
use crate::config::Config;

use super::types::{Entity, Page, Stock};

/// Per-repository settings, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryConfig {
  /// Resource path relative to the API origin
  pub base_url: String,
  /// Name used in error messages
  pub entity_name: String,
  pub cache_timeout: Duration,
  /// Extra attempts after a failed call
  pub retry_attempts: u32,
  pub cache_enabled: bool,
  pub retry_scope: RetryScope,
  pub retry_delay: Duration,
}

impl RepositoryConfig {
  pub fn new(base_url: impl Into<String>, entity_name: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      entity_name: entity_name.into(),
      cache_timeout: Duration::from_secs(5 * 60),
      retry_attempts: 3,
      cache_enabled: true,
      retry_scope: RetryScope::AllFailures,
      retry_delay: Duration::ZERO,
    }
  }

  /// Defaults for an entity type.
  pub fn for_entity<T: Entity>() -> Self {
    Self::new(T::RESOURCE, T::NAME)
  }

  /// Settings for an entity type taken from the application config.
  pub fn from_config<T: Entity>(config: &Config) -> Self {
    Self {
      cache_timeout: Duration::from_millis(config.cache.timeout_ms),
      retry_attempts: config.retry.attempts,
      cache_enabled: config.cache.enabled,
      retry_scope: config.retry.scope,
      retry_delay: Duration::from_millis(config.retry.delay_ms),
      ..Self::for_entity::<T>()
    }
  }

  pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
    self.cache_timeout = timeout;
    self
  }

  pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
    self.retry_attempts = attempts;
    self
  }

  pub fn without_cache(mut self) -> Self {
    self.cache_enabled = false;
    self
  }

  fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.retry_attempts)
      .with_scope(self.retry_scope)
      .with_delay(self.retry_delay)
  }
}

/// Cache-aside CRUD access to one resource.
///
/// Reads go through an in-memory cache keyed by URL and query parameters;
/// any successful write drops the whole cache of this repository.
pub struct Repository<T> {
  transport: Arc<dyn Transport>,
  config: RepositoryConfig,
  cache: CacheLayer<RepositoryError>,
  retry: RetryPolicy,
  refresh: watch::Sender<u64>,
  _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
  pub fn new(transport: Arc<dyn Transport>, config: RepositoryConfig) -> Self {
    let cache = if config.cache_enabled {
      CacheLayer::new(MemoryStorage::new())
    } else {
      CacheLayer::new(NoopStorage)
    }
    .with_ttl(config.cache_timeout);
    let (refresh, _) = watch::channel(0);

    Self {
      transport,
      retry: config.retry_policy(),
      config,
      cache,
      refresh,
      _entity: PhantomData,
    }
  }

  pub fn config(&self) -> &RepositoryConfig {
    &self.config
  }

  /// Get all entities
  pub async fn find_all(&self, params: Option<&QueryParams>) -> Result<Vec<T>, RepositoryError> {
    self.get("", QueryParams::new().merged(params)).await
  }

  /// Get one page of entities. Caller `params` win over `page`/`size`.
  pub async fn find_all_paginated(
    &self,
    page: u32,
    size: u32,
    params: Option<&QueryParams>,
  ) -> Result<Page<T>, RepositoryError> {
    let params = QueryParams::new()
      .with("page", page)
      .with("size", size)
      .merged(params);
    self.get("paginated", params).await
  }

  /// Get entity by ID
  pub async fn find_by_id(&self, id: &str) -> Result<T, RepositoryError> {
    self.get(&path_segment(id), QueryParams::new()).await
  }

  /// Get entity by UUID
  pub async fn find_by_uuid(&self, uuid: &str) -> Result<T, RepositoryError> {
    self
      .get(&format!("uuid/{}", path_segment(uuid)), QueryParams::new())
      .await
  }

  /// Get entity by its business code
  pub async fn find_by_code(&self, code: &str) -> Result<T, RepositoryError> {
    self
      .get(&format!("code/{}", path_segment(code)), QueryParams::new())
      .await
  }

  /// Get active entities
  pub async fn find_active(&self, params: Option<&QueryParams>) -> Result<Vec<T>, RepositoryError> {
    self.get("active", QueryParams::new().merged(params)).await
  }

  /// Search entities; `params` may override the query itself.
  pub async fn search(
    &self,
    query: &str,
    params: Option<&QueryParams>,
  ) -> Result<Vec<T>, RepositoryError> {
    self
      .get("search", QueryParams::new().with("q", query).merged(params))
      .await
  }

  /// Create new entity
  pub async fn create<D: Serialize + ?Sized>(&self, draft: &D) -> Result<T, RepositoryError> {
    let body = self.encode("", draft)?;
    let response = self.write(Method::Post, "", Some(body)).await?;
    self.decode(Method::Post, "", &response)
  }

  /// Update existing entity
  pub async fn update<D: Serialize + ?Sized>(&self, id: &str, draft: &D) -> Result<T, RepositoryError> {
    let endpoint = path_segment(id);
    let body = self.encode(&endpoint, draft)?;
    let response = self.write(Method::Put, &endpoint, Some(body)).await?;
    self.decode(Method::Put, &endpoint, &response)
  }

  /// Partially update entity; only the fields present in `patch` change.
  pub async fn partial_update<D: Serialize + ?Sized>(
    &self,
    id: &str,
    patch: &D,
  ) -> Result<T, RepositoryError> {
    let endpoint = path_segment(id);
    let body = self.encode(&endpoint, patch)?;
    let response = self.write(Method::Patch, &endpoint, Some(body)).await?;
    self.decode(Method::Patch, &endpoint, &response)
  }

  /// Delete entity
  pub async fn remove(&self, id: &str) -> Result<(), RepositoryError> {
    self
      .write(Method::Delete, &path_segment(id), None)
      .await
      .map(|_| ())
  }

  /// Activate entity
  pub async fn activate(&self, id: &str) -> Result<T, RepositoryError> {
    self.action(id, "activate", QueryParams::new()).await
  }

  /// Deactivate entity
  pub async fn deactivate(&self, id: &str) -> Result<T, RepositoryError> {
    self.action(id, "deactivate", QueryParams::new()).await
  }

  /// Drop cached data and notify refresh subscribers.
  pub fn refresh(&self) {
    self.cache.invalidate_all();
    self.refresh.send_modify(|generation| *generation += 1);
  }

  /// Receive a notification each time `refresh` is called.
  pub fn subscribe_refresh(&self) -> watch::Receiver<u64> {
    self.refresh.subscribe()
  }

  /// `PUT /{id}/{action}` with an empty object body.
  async fn action(&self, id: &str, action: &str, params: QueryParams) -> Result<T, RepositoryError> {
    let endpoint = format!("{}/{}", path_segment(id), action);
    let response = self
      .write_with(
        Method::Put,
        &endpoint,
        Some(Value::Object(Default::default())),
        params,
      )
      .await?;
    self.decode(Method::Put, &endpoint, &response)
  }

  fn url(&self, endpoint: &str) -> String {
    let base = self.config.base_url.trim_end_matches('/');
    if endpoint.is_empty() {
      self.transport.resolve(base)
    } else {
      self.transport.resolve(&format!("{}/{}", base, endpoint))
    }
  }

  /// Cached, de-duplicated read.
  async fn get<R: DeserializeOwned>(
    &self,
    endpoint: &str,
    params: QueryParams,
  ) -> Result<R, RepositoryError> {
    let url = self.url(endpoint);
    let key = RequestKey::new(url.clone(), params.clone());

    let transport = Arc::clone(&self.transport);
    let retry = self.retry.clone();
    let entity_name = self.config.entity_name.clone();

    let result = self
      .cache
      .fetch(&key, move || async move {
        let request = ApiRequest::get(url.clone()).with_query(params.to_pairs());
        let label = format!("GET {}", url);
        let response = retry
          .run(&label, || transport.execute(request.clone()))
          .await
          .map_err(|e| RepositoryError::from_transport(e, &url, &entity_name).report(Method::Get))?;
        response
          .json::<Value>()
          .map_err(|e| RepositoryError::decode(response.status, &url, &entity_name, e))
      })
      .await?;

    serde_json::from_value(result.data).map_err(|e| {
      RepositoryError::decode(200, &key.url, &self.config.entity_name, e).report(Method::Get)
    })
  }

  async fn write(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
  ) -> Result<ApiResponse, RepositoryError> {
    self.write_with(method, endpoint, body, QueryParams::new()).await
  }

  /// Uncached call that invalidates the cache once it succeeds.
  async fn write_with(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
    params: QueryParams,
  ) -> Result<ApiResponse, RepositoryError> {
    let url = self.url(endpoint);
    let mut request = ApiRequest::new(method, url.clone()).with_query(params.to_pairs());
    if let Some(body) = body {
      request = request.with_body(body);
    }

    let label = format!("{} {}", method, url);
    let response = self
      .retry
      .run(&label, || self.transport.execute(request.clone()))
      .await
      .map_err(|e| {
        RepositoryError::from_transport(e, &url, &self.config.entity_name).report(method)
      })?;

    self.cache.invalidate_all();
    Ok(response)
  }

  fn decode<R: DeserializeOwned>(
    &self,
    method: Method,
    endpoint: &str,
    response: &ApiResponse,
  ) -> Result<R, RepositoryError> {
    response.json().map_err(|e| {
      RepositoryError::decode(response.status, &self.url(endpoint), &self.config.entity_name, e)
        .report(method)
    })
  }

  fn encode<D: Serialize + ?Sized>(&self, endpoint: &str, draft: &D) -> Result<Value, RepositoryError> {
    serde_json::to_value(draft).map_err(|e| RepositoryError {
      kind: ErrorKind::InvalidRequest,
      message: format!("Failed to encode {}: {}", self.config.entity_name, e),
      status: 0,
      timestamp: chrono::Utc::now(),
      path: self.url(endpoint),
      details: None,
    })
  }
}

impl Repository<Stock> {
  /// Stock records at or below their minimum level
  pub async fn find_low_stock(&self) -> Result<Vec<Stock>, RepositoryError> {
    self.get("low", QueryParams::new()).await
  }

  /// Stock records at or above their maximum level
  pub async fn find_over_stock(&self) -> Result<Vec<Stock>, RepositoryError> {
    self.get("over", QueryParams::new()).await
  }

  /// Stock records with nothing left
  pub async fn find_out_of_stock(&self) -> Result<Vec<Stock>, RepositoryError> {
    self.get("zero", QueryParams::new()).await
  }

  /// Stock records of one product across warehouses
  pub async fn find_by_product(&self, product_id: &str) -> Result<Vec<Stock>, RepositoryError> {
    self
      .get(&format!("product/{}", path_segment(product_id)), QueryParams::new())
      .await
  }

  pub async fn find_by_product_code(&self, product_code: &str) -> Result<Vec<Stock>, RepositoryError> {
    self
      .get(&format!("product/code/{}", path_segment(product_code)), QueryParams::new())
      .await
  }

  /// Stock records held in one warehouse
  pub async fn find_by_warehouse(&self, warehouse_id: &str) -> Result<Vec<Stock>, RepositoryError> {
    self
      .get(&format!("warehouse/{}", path_segment(warehouse_id)), QueryParams::new())
      .await
  }

  pub async fn find_by_warehouse_code(&self, warehouse_code: &str) -> Result<Vec<Stock>, RepositoryError> {
    self
      .get(&format!("warehouse/code/{}", path_segment(warehouse_code)), QueryParams::new())
      .await
  }

  /// The stock record of one product in one warehouse
  pub async fn find_by_product_and_warehouse(
    &self,
    product_id: &str,
    warehouse_id: &str,
  ) -> Result<Stock, RepositoryError> {
    let endpoint = format!(
      "product/{}/warehouse/{}",
      path_segment(product_id),
      path_segment(warehouse_id)
    );
    self.get(&endpoint, QueryParams::new()).await
  }

  /// Increase the quantity of a stock record
  pub async fn add_stock(&self, id: &str, quantity: u32) -> Result<Stock, RepositoryError> {
    self
      .action(id, "add", QueryParams::new().with("quantity", quantity))
      .await
  }

  /// Decrease the quantity of a stock record
  pub async fn remove_stock(&self, id: &str, quantity: u32) -> Result<Stock, RepositoryError> {
    self
      .action(id, "remove", QueryParams::new().with("quantity", quantity))
      .await
  }
}
