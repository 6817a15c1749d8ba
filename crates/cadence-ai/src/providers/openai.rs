//! OpenAI-compatible Chat Completions provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ChatProvider;
use crate::{
    error::{Error, Result},
    stream::{ProtocolEventStream, decode_byte_stream},
    types::{Context, Message, ModelConfig, Role},
};

/// Chat Completions API client bound to one model configuration
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: ModelConfig,
}

impl OpenAIProvider {
    /// Create a new provider with an API key
    pub fn new(api_key: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model,
        }
    }

    /// The model this provider talks to
    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &self.model.headers {
            if let (Ok(name), Ok(val)) = (
                key.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, val);
            } else {
                tracing::warn!("Skipping invalid upstream header '{}'", key);
            }
        }
        headers
    }

    async fn send(&self, request: &OpenAIRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.model.completions_url())
            .bearer_auth(&self.api_key)
            .headers(self.headers())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Upstream error {}: {}", status.as_u16(), body);
            return Err(Error::rejected(status.as_u16(), body));
        }
        Ok(response)
    }

    fn build_request(&self, context: &Context) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);

        if let Some(ref system_prompt) = context.system_prompt {
            messages.push(OpenAIMessage {
                role: Role::System,
                content: system_prompt.clone(),
            });
        }
        messages.extend(context.messages.iter().map(OpenAIMessage::from));

        let tools = if context.tools.is_empty() {
            None
        } else {
            Some(
                context
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        tool_type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let has_tools = tools.is_some();
        OpenAIRequest {
            model: self.model.id.clone(),
            messages,
            stream: true,
            max_tokens: self.model.max_tokens,
            tools,
            tool_choice: has_tools.then(|| "auto".to_string()),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    async fn stream(&self, context: &Context) -> Result<ProtocolEventStream> {
        let request = self.build_request(context);
        tracing::debug!(
            "Streaming from {} ({} messages, {} tools)",
            self.model.id,
            request.messages.len(),
            context.tools.len()
        );
        let response = self.send(&request).await?;
        Ok(decode_byte_stream(response.bytes_stream()))
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model.id.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            stream: false,
            max_tokens: self.model.max_tokens,
            tools: None,
            tool_choice: None,
        };
        let response = self.send(&request).await?;
        let completion: CompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::UnexpectedResponse("completion has no content".to_string()))
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: Role,
    content: String,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolSchema;
    use serde_json::json;

    fn provider() -> OpenAIProvider {
        let mut model = ModelConfig::new("claude-haiku-4.5", "https://api.example.com");
        model
            .headers
            .insert("Copilot-Integration-Id".into(), "vscode-chat".into());
        OpenAIProvider::new("key", model)
    }

    #[test]
    fn test_request_puts_system_prompt_first() {
        let mut context = Context::new("Be brief.");
        context.push(Message::user("Hello"));
        context.push(Message::assistant("Hi."));

        let body = serde_json::to_value(provider().build_request(&context)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-haiku-4.5",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hi."}
                ],
                "stream": true,
                "max_tokens": 1024
            })
        );
    }

    #[test]
    fn test_request_with_tools_sets_auto_choice() {
        let context = Context::new("sys").with_tools(vec![ToolSchema {
            name: "write_scratchpad".into(),
            description: "Write notes".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }]);

        let body = serde_json::to_value(provider().build_request(&context)).unwrap();
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "write_scratchpad");
    }

    #[test]
    fn test_configured_headers_attached() {
        let headers = provider().headers();
        assert_eq!(headers.get("copilot-integration-id").unwrap(), "vscode-chat");
    }

    #[test]
    fn test_completion_response_parses() {
        let raw = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"{\"title\":\"x\"}"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"title\":\"x\"}")
        );
    }
}
