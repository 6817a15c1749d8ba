//! Session completion tool

use async_trait::async_trait;
use cadence_ai::{ChatProvider, Message, Role};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, LazyLock};

use crate::prompts::extraction_prompt;
use crate::store::SessionStore;
use crate::tool::{Tool, ToolResult, TurnContext};

/// First-brace to last-brace span of a model reply
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Ends the session: asks the model for a title, summary and facts and stores them
pub struct CompleteSessionTool {
    provider: Arc<dyn ChatProvider>,
    store: Arc<dyn SessionStore>,
}

impl CompleteSessionTool {
    pub fn new(provider: Arc<dyn ChatProvider>, store: Arc<dyn SessionStore>) -> Self {
        Self { provider, store }
    }

    async fn run(&self, session_id: &str) -> Result<serde_json::Value, String> {
        if self
            .store
            .session(session_id)
            .await
            .map_err(|e| e.to_string())?
            .is_none()
        {
            return Err("Session not found".to_string());
        }

        let history = self
            .store
            .read_history(session_id)
            .await
            .map_err(|e| e.to_string())?;
        if history.is_empty() {
            return Err("No messages in session".to_string());
        }

        let prompt = extraction_prompt(&build_transcript(&history));
        let reply = self
            .provider
            .complete(&[Message::user(prompt)])
            .await
            .map_err(|e| {
                tracing::error!("Extraction request failed: {}", e);
                "Failed to extract facts".to_string()
            })?;

        let extraction = parse_extraction(&reply).ok_or_else(|| {
            tracing::warn!("Could not parse extraction reply: {}", reply);
            "Failed to parse extraction".to_string()
        })?;

        let summary = extraction.summary.to_string();
        let session = self
            .store
            .complete_session(session_id, &extraction.title, &summary)
            .await
            .map_err(|e| e.to_string())?;
        let facts = self
            .store
            .add_facts(session_id, &extraction.facts)
            .await
            .map_err(|e| e.to_string())?;

        tracing::info!(
            "Completed session {} ({:?}) with {} fact(s)",
            session_id,
            extraction.title,
            facts.len()
        );
        Ok(json!({ "session": session, "facts": facts }))
    }
}

#[async_trait]
impl Tool for CompleteSessionTool {
    fn name(&self) -> &str {
        "complete_session"
    }

    fn description(&self) -> &str {
        "End the coaching session and generate a summary. Use when the user says goodbye or the conversation has naturally concluded. Always give a warm goodbye before calling this tool."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _arguments: serde_json::Value, ctx: &TurnContext) -> ToolResult {
        match self.run(&ctx.session_id).await {
            Ok(payload) => ToolResult::success(payload),
            Err(message) => ToolResult::error(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Extraction {
    title: String,
    #[serde(default)]
    facts: Vec<String>,
    #[serde(default)]
    summary: serde_json::Value,
}

fn build_transcript(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                _ => "Coach",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parse_extraction(reply: &str) -> Option<Extraction> {
    let object = JSON_OBJECT.find(reply)?;
    serde_json::from_str(object.as_str()).ok()
}
