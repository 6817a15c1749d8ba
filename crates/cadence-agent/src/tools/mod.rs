//! Built-in coaching tools

mod finalize;
mod presentation;
mod scratchpad;

pub use finalize::CompleteSessionTool;
pub use presentation::StartPresentationTool;
pub use scratchpad::{EditScratchpadTool, WriteScratchpadTool};

use cadence_ai::ChatProvider;
use std::sync::Arc;

use crate::store::SessionStore;
use crate::tool::BoxedTool;

/// The registered tool set, in schema order
pub fn builtin_tools(
    provider: Arc<dyn ChatProvider>,
    store: Arc<dyn SessionStore>,
) -> Vec<BoxedTool> {
    vec![
        Arc::new(CompleteSessionTool::new(provider, store.clone())),
        Arc::new(StartPresentationTool::new(store.clone())),
        Arc::new(WriteScratchpadTool::new(store.clone())),
        Arc::new(EditScratchpadTool::new(store)),
    ]
}
