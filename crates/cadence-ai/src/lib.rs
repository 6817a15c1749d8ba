//! cadence-ai: upstream chat-completions protocol
//!
//! Decodes the chunked `data:`-framed response of an OpenAI-compatible
//! endpoint into ordered protocol events and reassembles fragmented tool
//! calls into executable invocations.

pub mod accumulator;
pub mod error;
pub mod providers;
pub mod sse;
pub mod stream;
pub mod types;

pub use accumulator::{PendingInvocation, ToolCallAccumulator, ToolInvocation};
pub use error::{Error, Result};
pub use providers::{ChatProvider, get_api_key, openai::OpenAIProvider};
pub use stream::{FrameDecoder, ProtocolEvent, ProtocolEventStream, decode_byte_stream};
pub use types::*;
