//! Tool trait and results

use async_trait::async_trait;
use cadence_ai::ToolSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-turn context handed to every tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    /// Session the turn belongs to
    pub session_id: String,
}

impl TurnContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Payload reported to the client: a tool-specific object, or `{"error": ..}`
    pub payload: serde_json::Value,
    /// Whether the execution failed
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            payload: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }

    /// The error message, if this is a failure
    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error {
            return None;
        }
        self.payload.get("error").and_then(|v| v.as_str())
    }
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: serde_json::Value, ctx: &TurnContext) -> ToolResult;
}

/// Type alias for a shared tool
pub type BoxedTool = Arc<dyn Tool>;

/// Build the upstream schema entry for a tool
pub fn to_schema(tool: &dyn Tool) -> ToolSchema {
    ToolSchema {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}

/// Read a required string argument
pub(crate) fn required_str<'a>(
    arguments: &'a serde_json::Value,
    key: &str,
) -> std::result::Result<&'a str, ToolResult> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolResult::error(format!("Missing '{}' argument", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, arguments: serde_json::Value, ctx: &TurnContext) -> ToolResult {
            ToolResult::success(json!({
                "text": arguments.get("text").cloned().unwrap_or_default(),
                "session": ctx.session_id,
            }))
        }
    }

    #[tokio::test]
    async fn test_execute_sees_turn_context() {
        let result = EchoTool
            .execute(json!({"text": "hi"}), &TurnContext::new("s1"))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.payload, json!({"text": "hi", "session": "s1"}));
    }

    #[test]
    fn test_error_payload_shape() {
        let r = ToolResult::error("bad");
        assert!(r.is_error);
        assert_eq!(r.payload, json!({"error": "bad"}));
        assert_eq!(r.error_message(), Some("bad"));
        assert_eq!(ToolResult::success(json!({})).error_message(), None);
    }

    #[test]
    fn test_to_schema() {
        let schema = to_schema(&EchoTool);
        assert_eq!(schema.name, "echo");
        assert_eq!(schema.description, "Echoes input");
        assert_eq!(schema.parameters["type"], "object");
    }

    #[test]
    fn test_required_str() {
        let args = json!({"content": "x", "n": 1});
        assert_eq!(required_str(&args, "content").unwrap(), "x");
        let err = required_str(&args, "n").unwrap_err();
        assert_eq!(err.error_message(), Some("Missing 'n' argument"));
    }
}
