//! Error types for the persistent cache

use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    /// HTTP transport error (connection refused, reset, body read failure)
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Document or collection absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// A document with this id already exists
    #[error("Document already exists: {0}")]
    Conflict(String),

    /// Key cannot be used as a document id
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Stored value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Backend answered with an unexpected status
    #[error("Backend error (status {status}): {body}")]
    Backend { status: u16, body: String },

    /// Invalid response from the backend
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request timed out
    #[error("Operation timeout")]
    Timeout,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend unreachable or failing after all retry attempts
    #[error("Storage unavailable after {attempts} attempt(s): {source}")]
    StorageUnavailable {
        attempts: usize,
        #[source]
        source: Box<CacheError>,
    },
}

impl CacheError {
    /// Whether a failed backend call is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::HttpError(e) => !e.is_builder(),
            CacheError::Timeout | CacheError::Conflict(_) => true,
            CacheError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this is the backend's "absent" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

impl From<base64::DecodeError> for CacheError {
    fn from(err: base64::DecodeError) -> Self {
        CacheError::Decode(format!("invalid base64: {err}"))
    }
}
