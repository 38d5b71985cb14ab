//! HTTP plumbing: the transport seam, its reqwest implementation, retry
//! policy, request signatures and error normalization.

pub mod client;
pub mod error;
pub mod query;
pub mod retry;
pub mod transport;

pub use client::HttpTransport;
pub use error::{ErrorClass, ErrorKind, RepositoryError};
pub use query::{path_segment, QueryParams, RequestKey};
pub use retry::{RetryPolicy, RetryScope};
pub use transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};
