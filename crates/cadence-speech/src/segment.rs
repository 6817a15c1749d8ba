//! Sentence and pause segmentation of streamed text
//!
//! Text arrives in arbitrary increments. Each increment is appended to the
//! unspoken suffix, which is then scanned for complete sentences (a terminator
//! followed by whitespace) and pause markers. Whatever does not yet form a
//! complete unit stays pending until more text or the end of the turn.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

use crate::markup::{PAUSE_TOKEN, strip_markup};

/// Default length of a pause segment
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(600);

/// Shortest run ending in `.`, `!` or `?` that is followed by whitespace
static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.+?[.!?])\s+").expect("valid regex"));

/// One unit of playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpeechSegment {
    /// Text to speak, already stripped of markup
    Speech { text: String },
    /// Silence of a fixed length
    Pause { duration_ms: u64 },
}

impl SpeechSegment {
    /// Create a speech segment
    pub fn speech(text: impl Into<String>) -> Self {
        Self::Speech { text: text.into() }
    }

    /// Create a pause segment
    pub fn pause(duration: Duration) -> Self {
        Self::Pause {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Text of a speech segment
    pub fn text(&self) -> Option<&str> {
        match self {
            SpeechSegment::Speech { text } => Some(text),
            SpeechSegment::Pause { .. } => None,
        }
    }
}

/// Incremental segmenter for one turn
#[derive(Debug)]
pub struct Segmenter {
    /// Raw text received but not yet cut into segments
    pending: String,
    pause: Duration,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_PAUSE)
    }
}

impl Segmenter {
    /// Create a segmenter emitting pauses of the given length
    pub fn new(pause: Duration) -> Self {
        Self {
            pending: String::new(),
            pause,
        }
    }

    /// Append a text increment and return every segment it completed, in order
    pub fn push(&mut self, delta: &str) -> Vec<SpeechSegment> {
        self.pending.push_str(delta);
        let mut segments = Vec::new();
        while let Some(consumed) = self.next_cut(&mut segments) {
            self.pending.drain(..consumed);
        }
        segments
    }

    /// End of turn: speak whatever is left, even without a terminator
    pub fn finish(&mut self) -> Vec<SpeechSegment> {
        let rest = std::mem::take(&mut self.pending);
        let text = strip_markup(&rest);
        if text.is_empty() {
            Vec::new()
        } else {
            vec![SpeechSegment::speech(text)]
        }
    }

    /// Drop pending text without speaking it
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Raw text still waiting for a boundary
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Find the earliest boundary in the pending text, push the segments it
    /// yields and return how many bytes it consumed.
    fn next_cut(&self, out: &mut Vec<SpeechSegment>) -> Option<usize> {
        let sentence = SENTENCE.captures(&self.pending);
        let pause = PAUSE_TOKEN.find(&self.pending);

        // A pause marker inside the next sentence comes first
        if let Some(pause) = pause {
            let before_sentence_end = sentence
                .as_ref()
                .and_then(|c| c.get(1))
                .is_none_or(|m| pause.start() < m.end());
            if before_sentence_end {
                push_speech(out, &self.pending[..pause.start()]);
                out.push(SpeechSegment::pause(self.pause));
                return Some(pause.end());
            }
        }

        let captures = sentence?;
        let whole = captures.get(0)?;
        let text = captures.get(1)?;
        push_speech(out, text.as_str());
        Some(whole.end())
    }
}

fn push_speech(out: &mut Vec<SpeechSegment>, raw: &str) {
    let text = strip_markup(raw);
    if !text.is_empty() {
        out.push(SpeechSegment::speech(text));
    }
}
