use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dataset an export job operates over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportCategory {
  Warehouse,
  Stock,
  Product,
}

impl ExportCategory {
  pub const ALL: [ExportCategory; 3] = [
    ExportCategory::Warehouse,
    ExportCategory::Stock,
    ExportCategory::Product,
  ];

  /// Wire form, used in request paths
  pub fn as_str(&self) -> &'static str {
    match self {
      ExportCategory::Warehouse => "WAREHOUSE",
      ExportCategory::Stock => "STOCK",
      ExportCategory::Product => "PRODUCT",
    }
  }

  /// Lower-case form used in file names and messages
  pub fn slug(&self) -> &'static str {
    match self {
      ExportCategory::Warehouse => "warehouse",
      ExportCategory::Stock => "stock",
      ExportCategory::Product => "product",
    }
  }
}

impl fmt::Display for ExportCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ExportCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|c| c.as_str().eq_ignore_ascii_case(s))
      .ok_or_else(|| format!("unknown export category '{}' (expected warehouse, stock or product)", s))
  }
}

/// Server-side job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

/// Client-side view of a job: the server status plus `Timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
  Pending,
  Processing,
  Completed,
  Failed,
  /// No terminal status within the watchdog window
  Timeout,
}

impl ExportStatus {
  /// Still waiting on the server
  pub fn is_active(&self) -> bool {
    matches!(self, ExportStatus::Pending | ExportStatus::Processing)
  }
}

impl From<JobStatus> for ExportStatus {
  fn from(status: JobStatus) -> Self {
    match status {
      JobStatus::Pending => ExportStatus::Pending,
      JobStatus::Processing => ExportStatus::Processing,
      JobStatus::Completed => ExportStatus::Completed,
      JobStatus::Failed => ExportStatus::Failed,
    }
  }
}

impl fmt::Display for ExportStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ExportStatus::Pending => "PENDING",
      ExportStatus::Processing => "PROCESSING",
      ExportStatus::Completed => "COMPLETED",
      ExportStatus::Failed => "FAILED",
      ExportStatus::Timeout => "TIMEOUT",
    };
    f.write_str(s)
  }
}

/// Job descriptor returned by the status and listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
  #[serde(rename = "uuid", alias = "id")]
  pub id: String,
  #[serde(default)]
  pub user_uuid: Option<String>,
  pub category: ExportCategory,
  #[serde(default)]
  pub export_type: Option<String>,
  pub status: JobStatus,
  #[serde(default)]
  pub file_url: Option<String>,
  #[serde(default)]
  pub error_message: Option<String>,
  /// Server local time, no zone
  pub created_at: NaiveDateTime,
  #[serde(default)]
  pub updated_at: Option<NaiveDateTime>,
}

/// Response to a job-creation request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTicket {
  pub job_id: String,
  #[serde(default)]
  pub message: Option<String>,
}

/// A completed export available for download.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
  pub job_id: String,
  pub file_name: String,
  pub file_url: String,
  pub created_at: DateTime<Utc>,
}

impl ExportedFile {
  pub fn new(
    job_id: impl Into<String>,
    category: ExportCategory,
    file_url: impl Into<String>,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      job_id: job_id.into(),
      file_name: Self::file_name(category, created_at),
      file_url: file_url.into(),
      created_at,
    }
  }

  /// Record for a completed job as listed by the backend.
  pub fn from_job(job: &ExportJob) -> Option<Self> {
    if job.status != JobStatus::Completed {
      return None;
    }
    let file_url = job.file_url.as_deref()?;
    Some(Self::new(
      job.id.clone(),
      job.category,
      file_url,
      Utc.from_utc_datetime(&job.created_at),
    ))
  }

  /// `<category>_export_<yyyy-mm-dd>.xlsx`
  pub fn file_name(category: ExportCategory, date: DateTime<Utc>) -> String {
    format!("{}_export_{}.xlsx", category.slug(), date.format("%Y-%m-%d"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_category_forms() {
    assert_eq!(serde_json::to_value(ExportCategory::Stock).unwrap(), json!("STOCK"));
    assert_eq!("warehouse".parse::<ExportCategory>(), Ok(ExportCategory::Warehouse));
    assert_eq!(ExportCategory::Product.slug(), "product");
    assert!("orders".parse::<ExportCategory>().is_err());
  }

  #[test]
  fn test_job_from_api() {
    let job: ExportJob = serde_json::from_value(json!({
      "uuid": "J1",
      "userUuid": "u-1",
      "category": "PRODUCT",
      "exportType": "EXCEL",
      "status": "COMPLETED",
      "fileUrl": "https://x/f.xlsx",
      "createdAt": "2024-05-02T23:10:00",
      "updatedAt": "2024-05-02T23:11:00"
    }))
    .unwrap();

    assert_eq!(job.id, "J1");
    assert_eq!(job.status, JobStatus::Completed);

    let file = ExportedFile::from_job(&job).unwrap();
    assert_eq!(file.file_name, "product_export_2024-05-02.xlsx");
    assert_eq!(file.file_url, "https://x/f.xlsx");
  }

  #[test]
  fn test_only_completed_jobs_with_files_are_listed() {
    let mut job: ExportJob = serde_json::from_value(json!({
      "id": "J2",
      "category": "STOCK",
      "status": "FAILED",
      "fileUrl": "https://x/f.xlsx",
      "createdAt": "2024-05-02T10:00:00"
    }))
    .unwrap();
    assert!(ExportedFile::from_job(&job).is_none());

    job.status = JobStatus::Completed;
    job.file_url = None;
    assert!(ExportedFile::from_job(&job).is_none());
  }

  #[test]
  fn test_ticket() {
    let ticket: ExportTicket =
      serde_json::from_value(json!({ "jobId": "J1", "message": "Export job created" })).unwrap();
    assert_eq!(ticket.job_id, "J1");
  }
}
