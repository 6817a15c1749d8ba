//! cadence-agent: turn relay and tool execution
//!
//! Re-multiplexes a decoded upstream reply onto the ordered outbound frame
//! stream and runs the tools the model asked for against the session store.

pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod prompts;
pub mod relay;
pub mod store;
pub mod tool;
pub mod tools;

pub use dispatcher::{REGISTRY_VERSION, ToolDispatcher};
pub use error::{Error, Result};
pub use frame::{OutboundFrame, ToolPhase};
pub use relay::{FrameStream, Relay};
pub use store::{
    FactRecord, MemoryStore, PresentationRecord, SessionRecord, SessionState, SessionStore,
    StoredMessage,
};
pub use tool::{BoxedTool, Tool, ToolResult, TurnContext};
