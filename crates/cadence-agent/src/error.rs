//! Error types for cadence-agent

use thiserror::Error;

/// Result type alias using cadence-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a turn
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the upstream protocol layer
    #[error(transparent)]
    Ai(#[from] cadence_ai::Error),

    /// The persistence collaborator failed
    #[error("Store error: {0}")]
    Store(String),

    /// Two tools were registered under the same name
    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
