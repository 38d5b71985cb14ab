//! Thin client for the export job endpoints.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{
  path_segment, ApiRequest, ApiResponse, Method, RepositoryError, RetryPolicy, Transport,
};

use super::types::{ExportCategory, ExportJob, ExportTicket};

const EXPORT_RESOURCE: &str = "inventory/export";
const ENTITY_NAME: &str = "Export job";

/// Issues job-creation, status, listing and download requests.
///
/// Creation is never retried since every call starts a new server-side job.
/// Status polls run in the background and use their own retry policy.
#[derive(Clone)]
pub struct ExportJobClient {
  transport: Arc<dyn Transport>,
  retry: RetryPolicy,
  poll_retry: RetryPolicy,
}

impl ExportJobClient {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self {
      transport,
      retry: RetryPolicy::default(),
      poll_retry: RetryPolicy::none(),
    }
  }

  /// Policy for listing and downloads.
  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Policy for status polls.
  pub fn with_poll_retry(mut self, retry: RetryPolicy) -> Self {
    self.poll_retry = retry;
    self
  }

  /// Start a new export job
  pub async fn request_export(&self, category: ExportCategory) -> Result<ExportTicket, RepositoryError> {
    let path = format!("{}/{}", EXPORT_RESOURCE, category.as_str());
    let response = self.send(&path, false, &RetryPolicy::none()).await?;
    let ticket: ExportTicket = self.decode(&path, &response)?;
    debug!(category = %category, job_id = %ticket.job_id, "Export job created");
    Ok(ticket)
  }

  /// Current descriptor of a job. Not counted as user-visible activity.
  pub async fn job_status(&self, job_id: &str) -> Result<ExportJob, RepositoryError> {
    let path = format!("{}/status/{}", EXPORT_RESOURCE, path_segment(job_id));
    let response = self.send(&path, true, &self.poll_retry).await?;
    self.decode(&path, &response)
  }

  /// All jobs visible to the caller, newest first.
  ///
  /// Entries that do not decode (for instance a category this client does
  /// not know) are skipped rather than failing the whole listing.
  pub async fn list_jobs(&self) -> Result<Vec<ExportJob>, RepositoryError> {
    let path = format!("{}/jobs", EXPORT_RESOURCE);
    let response = self.send(&path, false, &self.retry).await?;
    let entries: Vec<Value> = self.decode(&path, &response)?;

    let jobs = entries
      .into_iter()
      .filter_map(|entry| match serde_json::from_value::<ExportJob>(entry) {
        Ok(job) => Some(job),
        Err(e) => {
          warn!(error = %e, "Skipping unreadable export job entry");
          None
        }
      })
      .collect();
    Ok(jobs)
  }

  /// Contents of a completed export file
  pub async fn download(&self, job_id: &str) -> Result<Vec<u8>, RepositoryError> {
    let path = format!("{}/download/{}", EXPORT_RESOURCE, path_segment(job_id));
    let response = self.send(&path, false, &self.retry).await?;
    Ok(response.body)
  }

  /// Absolute download link for a job, for handing to a browser
  pub fn download_url(&self, job_id: &str) -> String {
    self
      .transport
      .resolve(&format!("{}/download/{}", EXPORT_RESOURCE, path_segment(job_id)))
  }

  async fn send(
    &self,
    path: &str,
    background: bool,
    retry: &RetryPolicy,
  ) -> Result<ApiResponse, RepositoryError> {
    let url = self.transport.resolve(path);
    let mut request = ApiRequest::get(url.clone());
    if background {
      request = request.in_background();
    }

    let label = format!("GET {}", url);
    retry
      .run(&label, || self.transport.execute(request.clone()))
      .await
      .map_err(|e| RepositoryError::from_transport(e, &url, ENTITY_NAME).report(Method::Get))
  }

  fn decode<T: DeserializeOwned>(&self, path: &str, response: &ApiResponse) -> Result<T, RepositoryError> {
    response.json().map_err(|e| {
      RepositoryError::decode(response.status, &self.transport.resolve(path), ENTITY_NAME, e)
        .report(Method::Get)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ErrorKind;
  use crate::export::types::JobStatus;
  use crate::testing::ScriptedTransport;
  use serde_json::json;

  fn job(id: &str, status: &str) -> serde_json::Value {
    json!({
      "uuid": id,
      "category": "WAREHOUSE",
      "status": status,
      "createdAt": "2024-05-02T10:00:00"
    })
  }

  #[tokio::test]
  async fn test_request_export_is_not_retried() {
    let transport = ScriptedTransport::new();
    transport.fail(Method::Get, "inventory/export/WAREHOUSE", 500);
    let client = ExportJobClient::new(transport.clone());

    let err = client.request_export(ExportCategory::Warehouse).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(transport.calls(Method::Get, "inventory/export/WAREHOUSE"), 1);
  }

  #[tokio::test]
  async fn test_job_status_runs_in_background() {
    let transport = ScriptedTransport::new();
    transport.respond(Method::Get, "inventory/export/status/J1", job("J1", "PROCESSING"));
    let client = ExportJobClient::new(transport.clone());

    let job = client.job_status("J1").await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(transport.requests()[0].background);
  }

  #[tokio::test]
  async fn test_poll_retry_policy() {
    let transport = ScriptedTransport::new();
    transport.fail(Method::Get, "inventory/export/status/J1", 0);
    transport.fail(Method::Get, "inventory/export/status/J2", 0);
    transport.respond(Method::Get, "inventory/export/status/J2", job("J2", "PENDING"));

    let strict = ExportJobClient::new(transport.clone());
    let err = strict.job_status("J1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.message, "Network error. Please check your connection.");
    assert_eq!(transport.calls(Method::Get, "inventory/export/status/J1"), 1);

    let tolerant = ExportJobClient::new(transport.clone()).with_poll_retry(RetryPolicy::new(1));
    assert!(tolerant.job_status("J2").await.is_ok());
    assert_eq!(transport.calls(Method::Get, "inventory/export/status/J2"), 2);
  }

  #[tokio::test]
  async fn test_list_jobs_skips_unknown_entries() {
    let transport = ScriptedTransport::new();
    transport.respond(
      Method::Get,
      "inventory/export/jobs",
      json!([
        job("J1", "COMPLETED"),
        { "uuid": "J2", "category": "AGGREGATE", "status": "COMPLETED", "createdAt": "2024-05-02T11:00:00" },
        { "uuid": "J3" },
        job("J4", "PENDING")
      ]),
    );
    let client = ExportJobClient::new(transport.clone());

    let jobs = client.list_jobs().await.unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["J1", "J4"]);
  }

  #[tokio::test]
  async fn test_list_jobs_rejects_non_list_body() {
    let transport = ScriptedTransport::new();
    transport.respond(Method::Get, "inventory/export/jobs", json!({ "jobs": [] }));
    let client = ExportJobClient::new(transport.clone()).with_retry(RetryPolicy::none());

    let err = client.list_jobs().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unknown);
  }

  #[tokio::test]
  async fn test_job_ids_are_encoded_in_paths() {
    let transport = ScriptedTransport::new();
    transport.respond(Method::Get, "inventory/export/status/J%2F1", job("J/1", "PENDING"));
    let client = ExportJobClient::new(transport.clone());

    assert_eq!(client.job_status("J/1").await.unwrap().id, "J/1");
    assert_eq!(
      client.download_url("J 1?x"),
      ScriptedTransport::url("inventory/export/download/J%201%3Fx")
    );
  }

  #[tokio::test]
  async fn test_download() {
    let transport = ScriptedTransport::new();
    transport.respond_raw(Method::Get, "inventory/export/download/J1", b"PK\x03\x04");
    let client = ExportJobClient::new(transport.clone());

    assert_eq!(client.download("J1").await.unwrap(), b"PK\x03\x04".to_vec());
    assert_eq!(
      client.download_url("J1"),
      ScriptedTransport::url("inventory/export/download/J1")
    );
  }
}
