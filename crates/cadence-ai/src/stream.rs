//! Upstream frame decoding
//!
//! Turns the raw byte stream of a streaming chat-completions response into an
//! ordered sequence of [`ProtocolEvent`]s.

use async_stream::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::{Error, Result};
use crate::sse::{DONE_SENTINEL, LineBuffer, data_payload};

/// Events decoded from the upstream stream, in wire order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Assistant text increment
    TextDelta { text: String },
    /// Fragment of a tool call, keyed by the upstream position index
    ToolCallDelta {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments_fragment: Option<String>,
    },
    /// Upstream finished normally
    StreamEnd,
}

impl ProtocolEvent {
    /// Create a text delta
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// Check if this is the terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolEvent::StreamEnd)
    }
}

/// A stream of decoded events; an `Err` item ends the stream
pub type ProtocolEventStream = Pin<Box<dyn Stream<Item = Result<ProtocolEvent>> + Send>>;

/// Incremental decoder for `data:`-framed chat-completion chunks
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
    finished: bool,
    malformed: usize,
}

impl FrameDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning the events from every line it completed.
    ///
    /// Once the sentinel has been seen, further input is ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        for line in self.lines.push(chunk) {
            self.decode_line(&line, &mut events);
            if self.finished {
                break;
            }
        }
        events
    }

    /// Whether the end-of-stream sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of payload lines dropped because they were not valid JSON
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// Close the decoder: decode any unterminated trailing line and append `StreamEnd`
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if !self.finished {
            if let Some(line) = self.lines.finish() {
                self.decode_line(&line, &mut events);
            }
            self.finished = true;
        }
        if self.malformed > 0 {
            tracing::warn!("Dropped {} malformed upstream line(s)", self.malformed);
        }
        events.push(ProtocolEvent::StreamEnd);
        events
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<ProtocolEvent>) {
        let Some(payload) = data_payload(line) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            self.finished = true;
            return;
        }

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.malformed += 1;
                tracing::debug!("Skipping malformed upstream line: {}", e);
                return;
            }
        };

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    out.push(ProtocolEvent::TextDelta { text: content });
                }
            }
            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments_fragment) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                out.push(ProtocolEvent::ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments_fragment,
                });
            }
        }
    }
}

/// Decode a byte stream into protocol events.
///
/// Ends with `StreamEnd` when the transport completes or the sentinel arrives,
/// whichever comes first. A transport error yields `TransportInterrupted` and
/// ends the stream without `StreamEnd`.
pub fn decode_byte_stream<S, B, E>(bytes: S) -> ProtocolEventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut bytes = Box::pin(bytes);
    Box::pin(stream! {
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.push(chunk.as_ref()) {
                        yield Ok(event);
                    }
                    if decoder.is_finished() {
                        break;
                    }
                }
                Err(e) => {
                    yield Err(Error::TransportInterrupted(e.to_string()));
                    return;
                }
            }
        }

        for event in decoder.finish() {
            yield Ok(event);
        }
    })
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: u32,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
