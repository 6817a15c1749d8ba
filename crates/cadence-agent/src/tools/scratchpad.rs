//! Shared scratchpad tools

use async_trait::async_trait;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::sync::Arc;

use crate::store::SessionStore;
use crate::tool::{Tool, ToolResult, TurnContext, required_str};

/// Replaces the scratchpad unconditionally
pub struct WriteScratchpadTool {
    store: Arc<dyn SessionStore>,
}

impl WriteScratchpadTool {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for WriteScratchpadTool {
    fn name(&self) -> &str {
        "write_scratchpad"
    }

    fn description(&self) -> &str {
        "Create or overwrite the session scratchpad with markdown. Use for tables, lists and structured notes such as SWOT analyses, pros/cons, projections or action items."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Markdown content for the scratchpad"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &TurnContext) -> ToolResult {
        let content = match required_str(&arguments, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        match self.store.replace_scratchpad(&ctx.session_id, content).await {
            Ok(()) => ToolResult::success(json!({ "scratchpad": content })),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Replaces one exact substring of the scratchpad
pub struct EditScratchpadTool {
    store: Arc<dyn SessionStore>,
}

impl EditScratchpadTool {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for EditScratchpadTool {
    fn name(&self) -> &str {
        "edit_scratchpad"
    }

    fn description(&self) -> &str {
        "Edit the session scratchpad by replacing an exact string with new content. Prefer this over rewriting once the scratchpad exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "old_str": {
                    "type": "string",
                    "description": "Exact text to find in the scratchpad"
                },
                "new_str": {
                    "type": "string",
                    "description": "Text to replace it with"
                }
            },
            "required": ["old_str", "new_str"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &TurnContext) -> ToolResult {
        let old_str = match required_str(&arguments, "old_str") {
            Ok(s) => s,
            Err(e) => return e,
        };
        let new_str = match required_str(&arguments, "new_str") {
            Ok(s) => s,
            Err(e) => return e,
        };

        let current = match self.store.read_scratchpad(&ctx.session_id).await {
            Ok(Some(c)) if !c.is_empty() => c,
            Ok(_) => {
                return ToolResult::error(
                    "The scratchpad is empty. Use write_scratchpad to create it first.",
                );
            }
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if old_str.is_empty() || !current.contains(old_str) {
            return ToolResult::error(
                "Could not find the exact text in the scratchpad. old_str must match exactly, including whitespace and newlines.",
            );
        }

        let updated = current.replacen(old_str, new_str, 1);
        if let Err(e) = self.store.replace_scratchpad(&ctx.session_id, &updated).await {
            return ToolResult::error(e.to_string());
        }

        let diff = generate_diff(&current, &updated);
        ToolResult::success(json!({ "scratchpad": updated, "diff": diff }))
    }
}

/// Line diff of a scratchpad edit
fn generate_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        output.push_str(sign);
        output.push_str(change.value());
        if change.missing_newline() {
            output.push('\n');
        }
    }
    output
}
