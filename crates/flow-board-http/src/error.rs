//! Error types for the HTTP backend

use flow_board::BoardError;
use thiserror::Error;

/// Errors talking to a remote board runtime
#[derive(Debug, Error)]
pub enum HttpBackendError {
    /// Transport failure (connection refused, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The runtime answered with a non-success status
    #[error("Runtime returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The runtime broke the expected response shape
    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<HttpBackendError> for BoardError {
    fn from(error: HttpBackendError) -> Self {
        BoardError::backend(error.to_string())
    }
}
