//! Error types for cadence-speech

use thiserror::Error;

/// Result type alias using cadence-speech Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the client side of a turn
#[derive(Error, Debug)]
pub enum Error {
    /// Rendering one segment failed; playback moves on
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// A playback consumer is already running for this queue
    #[error("Playback consumer already running")]
    ConsumerActive,

    /// The relay refused the request
    #[error("Relay error: {0}")]
    Relay(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
