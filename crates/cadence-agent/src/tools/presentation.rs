//! Presentation practice tool

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::store::SessionStore;
use crate::tool::{Tool, ToolResult, TurnContext};

const DEFAULT_TITLE: &str = "Presentation Practice";

/// Creates a presentation record the client then records against
pub struct StartPresentationTool {
    store: Arc<dyn SessionStore>,
}

impl StartPresentationTool {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for StartPresentationTool {
    fn name(&self) -> &str {
        "start_presentation_practice"
    }

    fn description(&self) -> &str {
        "Start a presentation practice exercise: the user records themselves giving a talk, pitch or speech and then receives timestamped feedback on clarity, accuracy, engagement and delivery. Use when the user wants to rehearse any spoken delivery."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Short title for the presentation (e.g., \"Product Pitch\", \"Team Update\")"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &TurnContext) -> ToolResult {
        let title = arguments
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);

        match self.store.create_presentation(&ctx.session_id, title).await {
            Ok(presentation) => ToolResult::success(json!({ "presentation": presentation })),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
