//! Outbound frames sent to the client

use serde::{Deserialize, Serialize};

/// Phase of a tool invocation as reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Executing,
    Completed,
}

/// Client-visible frames of one turn.
///
/// Within a turn all `Content` frames precede the single `Done`, which
/// precedes every `ToolStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Assistant text increment
    Content { text: String },

    /// The text phase of the turn is over
    Done,

    /// A tool invocation started or finished
    ToolStatus {
        name: String,
        phase: ToolPhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },

    /// The turn failed; no further frames follow
    Error { message: String },
}

impl OutboundFrame {
    /// Create a content frame
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Create an executing status frame
    pub fn executing(name: impl Into<String>) -> Self {
        Self::ToolStatus {
            name: name.into(),
            phase: ToolPhase::Executing,
            result: None,
        }
    }

    /// Create a completed status frame carrying the tool's result
    pub fn completed(name: impl Into<String>, result: serde_json::Value) -> Self {
        Self::ToolStatus {
            name: name.into(),
            phase: ToolPhase::Completed,
            result: Some(result),
        }
    }

    /// Create an error frame
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Content { .. } => "content",
            OutboundFrame::Done => "done",
            OutboundFrame::ToolStatus { .. } => "tool_status",
            OutboundFrame::Error { .. } => "error",
        }
    }
}
