//! Reassembly of fragmented tool calls
//!
//! Upstream sends each tool call as a series of deltas sharing a position
//! index. Arguments arrive as a serialized JSON string cut at arbitrary byte
//! boundaries, so fragments are concatenated and only parsed at finalization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stream::ProtocolEvent;

/// A tool call still receiving fragments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInvocation {
    pub id: String,
    pub name: String,
    pub arguments_buffer: String,
}

impl PendingInvocation {
    /// A slot can be executed only once it has a name
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// A complete, executable tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Upstream position index
    pub index: u32,
    pub id: String,
    pub name: String,
    /// Parsed arguments; always a JSON object
    pub arguments: serde_json::Value,
}

/// Index-keyed table of in-progress tool calls for one turn
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<u32, PendingInvocation>,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta to the slot at `index`, allocating it if unseen.
    ///
    /// `id` and `name` arrive whole and replace earlier values; argument
    /// fragments are appended.
    pub fn apply(
        &mut self,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments_fragment: Option<&str>,
    ) {
        let slot = self.slots.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            slot.id = id.to_string();
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            slot.name = name.to_string();
        }
        if let Some(fragment) = arguments_fragment {
            slot.arguments_buffer.push_str(fragment);
        }
    }

    /// Apply a protocol event if it is a tool-call delta. Returns whether it was consumed.
    pub fn process_event(&mut self, event: &ProtocolEvent) -> bool {
        match event {
            ProtocolEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments_fragment,
            } => {
                self.apply(
                    *index,
                    id.as_deref(),
                    name.as_deref(),
                    arguments_fragment.as_deref(),
                );
                true
            }
            _ => false,
        }
    }

    /// Look at a slot
    pub fn get(&self, index: u32) -> Option<&PendingInvocation> {
        self.slots.get(&index)
    }

    /// Number of allocated slots (valid or not)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot has been allocated
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Finalize all slots in ascending index order.
    ///
    /// Slots without a name are discarded. Arguments that fail to parse are
    /// replaced by an empty object.
    pub fn finish(self) -> Vec<ToolInvocation> {
        self.slots
            .into_iter()
            .filter_map(|(index, slot)| {
                if !slot.is_valid() {
                    tracing::debug!("Discarding unnamed tool call slot {}", index);
                    return None;
                }
                let arguments = parse_arguments(&slot.name, &slot.arguments_buffer);
                Some(ToolInvocation {
                    index,
                    id: slot.id,
                    name: slot.name,
                    arguments,
                })
            })
            .collect()
    }
}

fn parse_arguments(name: &str, buffer: &str) -> serde_json::Value {
    if buffer.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str::<serde_json::Value>(buffer) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(other) => {
            tracing::warn!(
                "Tool '{}' arguments are not an object ({}), using empty arguments",
                name,
                other
            );
            serde_json::json!({})
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse arguments for tool '{}': {}. Using empty arguments",
                name,
                e
            );
            serde_json::json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fragments_concatenate_per_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(0, Some("call_a"), Some("write_scratchpad"), Some(""));
        acc.apply(0, None, None, Some("{\"cont"));
        acc.apply(0, None, None, Some("ent\":\"# Plan\"}"));

        assert_eq!(acc.get(0).unwrap().arguments_buffer, "{\"content\":\"# Plan\"}");
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name, "write_scratchpad");
        assert_eq!(calls[0].arguments, json!({"content": "# Plan"}));
    }

    #[test]
    fn test_interleaving_across_indices_does_not_change_result() {
        let a = [
            (1, Some("id1"), Some("edit_scratchpad"), Some("{\"old_str\":")),
            (1, None, None, Some("\"x\",\"new_str\":\"y\"}")),
        ];
        let b = [
            (0, Some("id0"), Some("start_presentation_practice"), Some("{\"ti")),
            (0, None, None, Some("tle\":\"Pitch\"}")),
        ];

        // Every merge of the two sequences that keeps each one's own order
        let orders: [[usize; 4]; 6] = [
            [0, 1, 2, 3],
            [0, 2, 1, 3],
            [0, 2, 3, 1],
            [2, 0, 1, 3],
            [2, 0, 3, 1],
            [2, 3, 0, 1],
        ];
        let mut results = Vec::new();
        for order in orders {
            let mut acc = ToolCallAccumulator::new();
            let (mut ai, mut bi) = (0, 0);
            for slot in order {
                let (index, id, name, frag) = if slot < 2 {
                    ai += 1;
                    a[ai - 1]
                } else {
                    bi += 1;
                    b[bi - 1]
                };
                acc.apply(index, id, name, frag);
            }
            results.push(acc.finish());
        }

        for r in &results {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(results[0][0].name, "start_presentation_practice");
        assert_eq!(results[0][0].arguments, json!({"title": "Pitch"}));
        assert_eq!(results[0][1].arguments, json!({"old_str": "x", "new_str": "y"}));
    }

    #[test]
    fn test_finish_orders_by_ascending_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(2, None, Some("c"), None);
        acc.apply(0, None, Some("a"), None);
        acc.apply(1, None, Some("b"), None);
        let names: Vec<String> = acc.finish().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unnamed_slot_is_discarded() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(0, Some("call_0"), None, Some("{}"));
        acc.apply(1, Some("call_1"), Some("complete_session"), None);
        assert_eq!(acc.len(), 2);
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].index, 1);
    }

    #[test]
    fn test_empty_arguments_become_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(0, None, Some("complete_session"), None);
        assert_eq!(acc.finish()[0].arguments, json!({}));
    }

    #[test]
    fn test_unparseable_arguments_become_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(0, None, Some("write_scratchpad"), Some("{\"content\": \"unterminated"));
        acc.apply(1, None, Some("edit_scratchpad"), Some("[1, 2]"));
        let calls = acc.finish();
        assert_eq!(calls[0].arguments, json!({}));
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn test_empty_name_does_not_clobber() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(0, Some("call_0"), Some("complete_session"), None);
        acc.apply(0, Some(""), Some(""), Some("{}"));
        let slot = acc.get(0).unwrap();
        assert_eq!(slot.id, "call_0");
        assert_eq!(slot.name, "complete_session");
    }

    #[test]
    fn test_process_event_ignores_text() {
        let mut acc = ToolCallAccumulator::new();
        assert!(!acc.process_event(&ProtocolEvent::text("hi")));
        assert!(!acc.process_event(&ProtocolEvent::StreamEnd));
        assert!(acc.process_event(&ProtocolEvent::ToolCallDelta {
            index: 3,
            id: None,
            name: Some("x".into()),
            arguments_fragment: None,
        }));
        assert!(acc.get(3).is_some());
    }
}
