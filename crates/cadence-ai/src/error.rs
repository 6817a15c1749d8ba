//! Error types for cadence-ai

use thiserror::Error;

/// Result type alias using cadence-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the upstream model endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream answered with a non-success status before streaming began
    #[error("Upstream rejected request ({status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    /// The byte stream broke off after streaming began
    #[error("Upstream stream interrupted: {0}")]
    TransportInterrupted(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an upstream rejection from a status code and response body
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            status,
            body: body.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::TransportInterrupted(_) => true,
            Error::UpstreamRejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if this error happened before any event was produced
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::UpstreamRejected { .. } | Error::InvalidApiKey)
    }
}
