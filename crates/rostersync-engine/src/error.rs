//! Error types for the sync engine.
//!
//! Every failure is classified as transient or permanent. Transient errors
//! are safe to retry with backoff; permanent errors fail the current record
//! immediately and are reported in the run summary.

use thiserror::Error;

/// Errors produced by the codec, allocator, directory client, and the
/// engines built on top of them.
#[derive(Debug, Error)]
pub enum SyncError {
    // Input and configuration errors (permanent)
    /// Client or engine settings that cannot be used as given.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed name, date, or report field rejected at the boundary.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Remote directory errors
    /// The directory has no driver for the given reference.
    #[error("driver not found: {0}")]
    NotFound(String),

    /// The directory rejected our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The directory asked us to slow down.
    #[error("rate limited by the directory (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success HTTP status from the directory.
    #[error("directory error (status {status}): {detail}")]
    Api { status: u16, detail: String },

    // Transport errors (transient)
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("request timed out: {0}")]
    Timeout(String),

    /// A response body that did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    // Username registry errors
    /// Suffix probing hit the ceiling, which means the upstream data is
    /// corrupt rather than merely busy.
    #[error("username registry exhausted for base '{base}' (ceiling {ceiling})")]
    RegistryExhausted { base: String, ceiling: u32 },

    // Local persistence errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A transient failure that survived every allowed retry.
    #[error("max retries exceeded after {attempts} attempt(s): {message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

impl SyncError {
    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network { .. } | SyncError::Timeout(_) | SyncError::RateLimited { .. } => {
                true
            }
            SyncError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure will recur no matter how often we retry.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Stable machine-readable code for logs and reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::InvalidConfig(_) => "INVALID_CONFIG",
            SyncError::InvalidInput(_) => "INVALID_INPUT",
            SyncError::NotFound(_) => "NOT_FOUND",
            SyncError::Auth(_) => "AUTH_FAILED",
            SyncError::RateLimited { .. } => "RATE_LIMITED",
            SyncError::Api { .. } => "API_ERROR",
            SyncError::Network { .. } => "NETWORK_ERROR",
            SyncError::Timeout(_) => "TIMEOUT",
            SyncError::Parse(_) => "PARSE_ERROR",
            SyncError::RegistryExhausted { .. } => "REGISTRY_EXHAUSTED",
            SyncError::Io(_) => "IO_ERROR",
            SyncError::Csv(_) => "CSV_ERROR",
            SyncError::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        SyncError::InvalidInput(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        SyncError::Parse(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        SyncError::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout(e.to_string())
        } else if e.is_connect() {
            SyncError::network_with_source("connection failed", e)
        } else {
            let message = e.to_string();
            SyncError::network_with_source(message, e)
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
