use killmail_common::killmail::DocumentError;
use killmail_common::store::StoreError;
use reqwest::StatusCode;
use thiserror::Error;

/// Enumeration of reasons an authoritative killmail could not be obtained for a reference.
/// Every variant drops the event and backs off before the next poll.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("authoritative fetch failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("authoritative fetch for {url} returned {status}")]
    StatusError { status: StatusCode, url: String },
    #[error("authoritative fetch for {url} returned an empty body")]
    EmptyBodyError { url: String },
    #[error("failed to decode authoritative killmail: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error(transparent)]
    DocumentError(#[from] DocumentError),
}

impl EnrichError {
    /// Short label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            EnrichError::RequestError(_) => "transport",
            EnrichError::StatusError { .. } => "status",
            EnrichError::EmptyBodyError { .. } => "empty_body",
            EnrichError::DecodeError(_) => "decode",
            EnrichError::DocumentError(DocumentError::MissingField(_)) => "missing_field",
            EnrichError::DocumentError(DocumentError::InvalidTime(_)) => "invalid_time",
        }
    }
}

/// Enumeration of errors that stop the worker pool, and with it the process.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to build HTTP client: {0}")]
    HttpClientError(#[from] reqwest::Error),
    #[error("failed to install metrics recorder: {0}")]
    MetricsError(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to install signal handlers: {0}")]
    SignalError(#[from] std::io::Error),
    #[error("failed to serve probes and metrics on {bind}: {error}")]
    ServeError { bind: String, error: std::io::Error },
    #[error("{worker} could not be started after {attempts} attempts: {error}")]
    RestartsExhaustedError {
        worker: String,
        attempts: u32,
        error: StoreError,
    },
    #[error("{worker} panicked")]
    PanicError { worker: String },
}
