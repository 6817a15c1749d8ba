//! Upstream provider implementations

pub mod openai;

use crate::{Context, Error, Message, ProtocolEventStream, Result};
use async_trait::async_trait;

/// Trait for chat-completion providers
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start a streaming response.
    ///
    /// Fails with `UpstreamRejected` before any event when the endpoint
    /// answers with a non-success status.
    async fn stream(&self, context: &Context) -> Result<ProtocolEventStream>;

    /// Request a single non-streaming reply and return its text
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Get an API key from a provided value or the first set environment variable
pub fn get_api_key(provided: Option<&str>, env_vars: &[&str]) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    env_vars
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .ok_or(Error::InvalidApiKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provided_key_wins() {
        assert_eq!(
            get_api_key(Some("sk-test"), &["CADENCE_TEST_UNSET_VAR"]).unwrap(),
            "sk-test"
        );
    }

    #[test]
    fn test_missing_key_is_error() {
        let err = get_api_key(None, &["CADENCE_TEST_UNSET_VAR_1", "CADENCE_TEST_UNSET_VAR_2"]);
        assert!(matches!(err, Err(Error::InvalidApiKey)));
    }
}
