//! HTTP client for the relay's outbound frame stream

use async_stream::stream;
use cadence_agent::OutboundFrame;
use cadence_ai::sse::{LineBuffer, data_payload};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::{Error, Result};

/// Frames of one turn as received by the client
pub type ClientFrameStream = Pin<Box<dyn Stream<Item = Result<OutboundFrame>> + Send>>;

/// Incremental decoder for `data:`-framed outbound frames.
///
/// Lines that are not valid frames are skipped.
#[derive(Debug, Default)]
pub struct FrameReader {
    lines: LineBuffer,
    skipped: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<OutboundFrame> {
        let lines = self.lines.push(chunk);
        lines.iter().filter_map(|line| self.decode_line(line)).collect()
    }

    /// Decode a trailing unterminated line, if any
    pub fn finish(&mut self) -> Option<OutboundFrame> {
        let line = self.lines.finish()?;
        self.decode_line(&line)
    }

    /// Number of payload lines that were not valid frames
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &str) -> Option<OutboundFrame> {
        let payload = data_payload(line)?.trim();
        if payload.is_empty() {
            return None;
        }
        match serde_json::from_str(payload) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.skipped += 1;
                tracing::debug!("Skipping unparseable frame: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for a running relay
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send a message and stream the turn's frames
    pub async fn send(&self, session_id: &str, message: &str) -> Result<ClientFrameStream> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&ChatRequest {
                session_id,
                message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(Error::Relay(format!("{}: {}", status.as_u16(), message)));
        }

        Ok(read_frames(response.bytes_stream()))
    }
}

/// Decode a byte stream into outbound frames. Ends when the transport ends.
pub fn read_frames<S, B>(bytes: S) -> ClientFrameStream
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let mut bytes = Box::pin(bytes);
    Box::pin(stream! {
        let mut reader = FrameReader::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for frame in reader.push(chunk.as_ref()) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(Error::Http(e));
                    return;
                }
            }
        }
        if let Some(frame) = reader.finish() {
            yield Ok(frame);
        }
        if reader.skipped() > 0 {
            tracing::warn!("Skipped {} unparseable frame(s)", reader.skipped());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WIRE: &str = concat!(
        "data: {\"type\":\"content\",\"text\":\"Caf\u{e9} talk.\"}\n\n",
        ": keep-alive\n\n",
        "data: not json\n\n",
        "data: {\"type\":\"done\"}\n\n",
        "data: {\"type\":\"tool_status\",\"name\":\"write_scratchpad\",\"phase\":\"executing\"}\n\n",
        "data: {\"type\":\"tool_status\",\"name\":\"write_scratchpad\",\"phase\":\"completed\",\"result\":{\"scratchpad\":\"x\"}}\n\n",
    );

    fn expected() -> Vec<OutboundFrame> {
        vec![
            OutboundFrame::content("Caf\u{e9} talk."),
            OutboundFrame::Done,
            OutboundFrame::executing("write_scratchpad"),
            OutboundFrame::completed("write_scratchpad", json!({"scratchpad": "x"})),
        ]
    }

    #[test]
    fn test_reader_skips_noise() {
        let mut reader = FrameReader::new();
        let frames = reader.push(WIRE.as_bytes());
        assert_eq!(frames, expected());
        assert_eq!(reader.skipped(), 1);
        assert_eq!(reader.finish(), None);
    }

    #[test]
    fn test_reader_chunking_invariance() {
        let bytes = WIRE.as_bytes();
        for size in [1, 2, 3, 7, 64] {
            let mut reader = FrameReader::new();
            let mut frames: Vec<OutboundFrame> =
                bytes.chunks(size).flat_map(|c| reader.push(c)).collect();
            frames.extend(reader.finish());
            assert_eq!(frames, expected(), "chunk size {}", size);
        }
    }

    #[test]
    fn test_reader_unterminated_last_frame() {
        let mut reader = FrameReader::new();
        assert!(reader.push(b"data: {\"type\":\"done\"}").is_empty());
        assert_eq!(reader.finish(), Some(OutboundFrame::Done));
    }

    #[tokio::test]
    async fn test_read_frames_from_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, reqwest::Error>> = WIRE
            .as_bytes()
            .chunks(5)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let frames: Vec<OutboundFrame> = read_frames(futures::stream::iter(chunks))
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(frames, expected());
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ChatRequest {
            session_id: "s1",
            message: "hi",
        })
        .unwrap();
        assert_eq!(body, json!({"sessionId": "s1", "message": "hi"}));
    }
}
