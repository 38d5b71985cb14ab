use crate::api::RepositoryError;

/// Why an export workflow did not produce a file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExportError {
  /// A request to the export endpoints failed
  #[error(transparent)]
  Request(#[from] RepositoryError),

  /// The job finished unsuccessfully, or its status could not be checked
  #[error("{0}")]
  JobFailure(String),

  /// No terminal status within the watchdog window
  #[error("Export is taking longer than expected. Please check back later.")]
  JobTimeout,

  /// The consumer was torn down while the operation was running
  #[error("export consumer was torn down")]
  TornDown,
}
