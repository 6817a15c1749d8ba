//! Tool registry and dispatch

use cadence_ai::ToolSchema;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::tool::{BoxedTool, ToolResult, TurnContext, to_schema};

/// Revision of the tool schema set sent upstream.
///
/// Bump when a tool is added or removed, or when a parameter schema changes.
pub const REGISTRY_VERSION: u32 = 2;

/// Fixed set of named tools with their compiled argument validators
pub struct ToolDispatcher {
    tools: Vec<BoxedTool>,
    /// Cached compiled JSON schema validators keyed by tool name
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolDispatcher {
    /// Build a dispatcher. Fails if two tools share a name.
    pub fn new(tools: Vec<BoxedTool>) -> Result<Self> {
        let mut schema_cache = HashMap::new();
        for (i, tool) in tools.iter().enumerate() {
            if tools[..i].iter().any(|t| t.name() == tool.name()) {
                return Err(Error::DuplicateTool(tool.name().to_string()));
            }
            let schema = tool.parameters_schema();
            match jsonschema::validator_for(&schema) {
                Ok(validator) => {
                    schema_cache.insert(tool.name().to_string(), Arc::new(validator));
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid tool parameter schema for '{}', skipping validation: {}",
                        tool.name(),
                        e
                    );
                }
            }
        }
        Ok(Self {
            tools,
            schema_cache,
        })
    }

    /// Schema entries to pass upstream, one per handler
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| to_schema(t.as_ref())).collect()
    }

    /// Get tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Execute a named tool. Unknown names and invalid arguments become error
    /// results; this never fails the caller.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        ctx: &TurnContext,
    ) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            tracing::warn!("Model requested unknown tool '{}'", name);
            return ToolResult::error(format!("Unknown tool: {}", name));
        };

        if let Some(err) = self
            .schema_cache
            .get(name)
            .and_then(|validator| validate_with_validator(&arguments, validator))
        {
            tracing::warn!("Rejected arguments for tool '{}': {}", name, err);
            return ToolResult::error(err);
        }

        let result = tool.execute(arguments, ctx).await;
        if let Some(message) = result.error_message() {
            tracing::warn!("Tool '{}' failed: {}", name, message);
        } else {
            tracing::debug!("Tool '{}' completed", name);
        }
        result
    }
}

/// Validate tool arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed: {}",
            errors.join("; ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingTool {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Records calls"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {"content": {"type": "string"}},
                "required": []
            })
        }
        async fn execute(&self, _arguments: serde_json::Value, ctx: &TurnContext) -> ToolResult {
            self.calls.lock().push(format!("{}@{}", self.name, ctx.session_id));
            ToolResult::success(json!({"ok": true}))
        }
    }

    fn dispatcher(names: &[&'static str]) -> (ToolDispatcher, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tools: Vec<BoxedTool> = names
            .iter()
            .map(|&name| {
                Arc::new(RecordingTool {
                    name,
                    calls: calls.clone(),
                }) as BoxedTool
            })
            .collect();
        (ToolDispatcher::new(tools).unwrap(), calls)
    }

    #[tokio::test]
    async fn test_dispatches_by_name() {
        let (d, calls) = dispatcher(&["a", "b"]);
        let result = d.execute("b", json!({}), &TurnContext::new("s")).await;
        assert!(!result.is_error);
        assert_eq!(*calls.lock(), vec!["b@s"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let (d, calls) = dispatcher(&["a"]);
        let result = d.execute("nope", json!({}), &TurnContext::new("s")).await;
        assert_eq!(result.payload, json!({"error": "Unknown tool: nope"}));
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_handler() {
        let (d, calls) = dispatcher(&["a"]);
        let result = d
            .execute("a", json!({"content": 5}), &TurnContext::new("s"))
            .await;
        assert!(result.is_error);
        assert!(
            result.error_message().unwrap().contains("validation failed"),
            "got: {:?}",
            result.payload
        );
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tools: Vec<BoxedTool> = vec![
            Arc::new(RecordingTool {
                name: "a",
                calls: calls.clone(),
            }),
            Arc::new(RecordingTool { name: "a", calls }),
        ];
        assert!(matches!(
            ToolDispatcher::new(tools),
            Err(Error::DuplicateTool(name)) if name == "a"
        ));
    }

    #[test]
    fn test_schemas_match_handlers() {
        let (d, _) = dispatcher(&["a", "b"]);
        let names: Vec<String> = d.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(d.tool_names(), vec!["a", "b"]);
    }
}
