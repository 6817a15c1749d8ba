//! Line buffering for `data:`-framed event streams
//!
//! Byte chunks from the network do not line up with line boundaries (or with
//! UTF-8 character boundaries), so bytes are held until a newline arrives and
//! only complete lines are handed out.

/// Prefix carried by every payload line
pub const DATA_MARKER: &str = "data:";

/// Payload that terminates an upstream stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates raw bytes and yields complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    ///
    /// Line terminators (`\n` or `\r\n`) are not included.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Take the unterminated trailing fragment, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    /// Number of buffered bytes not yet forming a complete line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Extract the payload of a `data:` line; `None` for any other line
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_MARKER)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}
