//! Error types for the training API crate.

use thiserror::Error;

/// Result type for training API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while talking to the training backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// HTTP request could not be sent or the connection dropped.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("{endpoint} returned {status}: {message}")]
    Status {
        /// Endpoint path or URL that was requested.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Malformed response from {endpoint}: {source}")]
    Decode {
        /// Endpoint path or URL that was requested.
        endpoint: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An image URL could not be resolved against the endpoint.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Client configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, timeouts, 5xx responses, 408 and 429 are
    /// transient. Decode errors and other client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(e) => !e.is_builder() && !e.is_decode(),
            ApiError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ApiError::Decode { .. } | ApiError::InvalidUrl { .. } | ApiError::Configuration(_) => {
                false
            }
        }
    }
}
