//! cadence-speech: client side of a streamed turn
//!
//! Reads the relay's outbound frames, cuts the arriving text into sentences
//! and pauses, and plays them through a cancellable single-consumer queue.

pub mod client;
pub mod error;
pub mod markup;
pub mod narrator;
pub mod queue;
pub mod segment;
pub mod speaker;

pub use client::{ClientFrameStream, FrameReader, RelayClient};
pub use error::{Error, Result};
pub use markup::strip_markup;
pub use narrator::Narrator;
pub use queue::{PlaybackPhase, SpeechQueue};
pub use segment::{DEFAULT_PAUSE, Segmenter, SpeechSegment};
pub use speaker::{CommandSpeaker, Speaker};
