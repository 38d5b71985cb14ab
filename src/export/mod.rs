//! Server-side export jobs: requesting them, following them to a terminal
//! status and listing the files they produced.
//!
//! [`ExportOrchestrator`] drives jobs on behalf of [`ExportConsumer`]s. Each
//! consumer owns its own observable [`ExportState`] and at most one
//! [`PollingSession`], so several consumers can export concurrently.

mod client;
mod error;
mod orchestrator;
mod session;
mod state;
mod types;

pub use client::ExportJobClient;
pub use error::ExportError;
pub use orchestrator::{ExportConsumer, ExportOrchestrator};
pub use session::{CancelSignal, PollingSession};
pub use state::{ExportState, ExportStore, Subscription};
pub use types::{ExportCategory, ExportJob, ExportStatus, ExportTicket, ExportedFile, JobStatus};
