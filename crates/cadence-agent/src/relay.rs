//! Relay multiplexer
//!
//! Runs one turn: persists the user message, streams the upstream reply as
//! `Content` frames, then executes the requested tools one at a time.
//!
//! Frame order within a turn is fixed: every `Content`, then exactly one
//! `Done`, then an executing/completed `ToolStatus` pair per invocation in
//! ascending index order. A failure ends the turn with a single `Error`.
//!
//! The returned stream is lazy. Dropping it (for example when the client
//! disconnects) stops upstream reads and tool execution at the next
//! suspension point.

use async_stream::stream;
use cadence_ai::{
    ChatProvider, Context, Error as AiError, ProtocolEvent, Role, ToolCallAccumulator,
};
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

use crate::dispatcher::ToolDispatcher;
use crate::error::Result;
use crate::frame::OutboundFrame;
use crate::prompts::{FACT_LIMIT, RECENT_SESSION_LIMIT, build_system_prompt};
use crate::store::SessionStore;
use crate::tool::TurnContext;

/// Outbound frames of one turn
pub type FrameStream = Pin<Box<dyn Stream<Item = OutboundFrame> + Send>>;

/// Everything a turn needs
#[derive(Clone)]
pub struct Relay {
    provider: Arc<dyn ChatProvider>,
    dispatcher: Arc<ToolDispatcher>,
    store: Arc<dyn SessionStore>,
}

impl Relay {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        dispatcher: Arc<ToolDispatcher>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            store,
        }
    }

    /// Start a turn. Nothing happens until the returned stream is polled.
    pub fn run_turn(&self, session_id: impl Into<String>, message: impl Into<String>) -> FrameStream {
        let relay = self.clone();
        let session_id = session_id.into();
        let message = message.into();

        Box::pin(stream! {
            let turn = TurnContext::new(session_id.clone());

            if let Err(e) = relay.store.append_message(&session_id, Role::User, &message).await {
                tracing::error!("Failed to store user message for {}: {}", session_id, e);
                yield OutboundFrame::error(e.to_string());
                return;
            }

            let context = match relay.build_context(&session_id).await {
                Ok(context) => context,
                Err(e) => {
                    tracing::error!("Failed to load history for {}: {}", session_id, e);
                    yield OutboundFrame::error(e.to_string());
                    return;
                }
            };

            let mut events = match relay.provider.stream(&context).await {
                Ok(events) => events,
                Err(e) if e.is_rejection() => {
                    tracing::warn!("Upstream rejected turn for {}: {}", session_id, e);
                    yield OutboundFrame::error(e.to_string());
                    return;
                }
                Err(e) => {
                    tracing::error!("Upstream request failed for {}: {}", session_id, e);
                    yield OutboundFrame::error(e.to_string());
                    return;
                }
            };

            let mut text = String::new();
            let mut accumulator = ToolCallAccumulator::new();

            while let Some(event) = events.next().await {
                match event {
                    Ok(ProtocolEvent::TextDelta { text: delta }) => {
                        text.push_str(&delta);
                        yield OutboundFrame::Content { text: delta };
                    }
                    Ok(event) if event.is_terminal() => break,
                    Ok(event) => {
                        accumulator.process_event(&event);
                    }
                    Err(e) => {
                        if matches!(e, AiError::TransportInterrupted(_)) {
                            relay.persist_reply(&session_id, &text).await;
                        }
                        tracing::error!(
                            "Upstream stream failed for {} (retryable: {}): {}",
                            session_id,
                            e.is_retryable(),
                            e
                        );
                        yield OutboundFrame::error(e.to_string());
                        return;
                    }
                }
            }
            drop(events);

            relay.persist_reply(&session_id, &text).await;
            yield OutboundFrame::Done;

            let invocations = accumulator.finish();
            tracing::debug!(
                "Turn for {} streamed {} chars and requested {} tool(s)",
                session_id,
                text.len(),
                invocations.len()
            );

            for invocation in invocations {
                yield OutboundFrame::executing(&invocation.name);
                let result = relay
                    .dispatcher
                    .execute(&invocation.name, invocation.arguments, &turn)
                    .await;
                yield OutboundFrame::completed(invocation.name, result.payload);
            }
        })
    }

    async fn build_context(&self, session_id: &str) -> Result<Context> {
        let history = self.store.read_history(session_id).await?;

        let sessions = self
            .store
            .recent_sessions(session_id, RECENT_SESSION_LIMIT)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load previous sessions: {}", e);
                Vec::new()
            });
        let facts = self.store.facts(FACT_LIMIT).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load facts: {}", e);
            Vec::new()
        });

        let mut context = Context::new(build_system_prompt(&sessions, &facts))
            .with_tools(self.dispatcher.schemas());
        context.messages = history;
        Ok(context)
    }

    /// Store the assistant text. Blank text is skipped; failures are logged.
    async fn persist_reply(&self, session_id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if let Err(e) = self
            .store
            .append_message(session_id, Role::Assistant, text)
            .await
        {
            tracing::warn!("Failed to store assistant reply for {}: {}", session_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ToolPhase;
    use crate::store::MemoryStore;
    use crate::tool::{BoxedTool, Tool, ToolResult};
    use crate::tools::builtin_tools;
    use async_trait::async_trait;
    use cadence_ai::{Message, ProtocolEventStream};
    use parking_lot::Mutex;
    use serde_json::json;

    /// What the scripted provider does on `stream`
    #[derive(Clone)]
    enum Script {
        Events(Vec<ProtocolEvent>),
        InterruptAfter(Vec<ProtocolEvent>),
        Reject(u16),
    }

    struct ScriptedProvider {
        script: Script,
        completion: String,
        contexts: Mutex<Vec<Context>>,
    }

    impl ScriptedProvider {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                completion: String::new(),
                contexts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn stream(&self, context: &Context) -> cadence_ai::Result<ProtocolEventStream> {
            self.contexts.lock().push(context.clone());
            let items: Vec<cadence_ai::Result<ProtocolEvent>> = match self.script.clone() {
                Script::Events(events) => events.into_iter().map(Ok).collect(),
                Script::InterruptAfter(events) => events
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(AiError::TransportInterrupted(
                        "connection reset".into(),
                    ))))
                    .collect(),
                Script::Reject(status) => return Err(AiError::rejected(status, "denied")),
            };
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn complete(&self, _messages: &[Message]) -> cadence_ai::Result<String> {
            Ok(self.completion.clone())
        }
    }

    struct CountingTool {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "Counts"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: serde_json::Value, _ctx: &TurnContext) -> ToolResult {
            self.log.lock().push(self.name.clone());
            ToolResult::success(json!({"ran": self.name}))
        }
    }

    fn counting_relay(
        provider: Arc<ScriptedProvider>,
        names: &[&str],
    ) -> (Relay, Arc<MemoryStore>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tools: Vec<BoxedTool> = names
            .iter()
            .map(|name| {
                Arc::new(CountingTool {
                    name: name.to_string(),
                    log: log.clone(),
                }) as BoxedTool
            })
            .collect();
        let store = Arc::new(MemoryStore::new());
        let relay = Relay::new(
            provider,
            Arc::new(ToolDispatcher::new(tools).unwrap()),
            store.clone(),
        );
        (relay, store, log)
    }

    fn call(index: u32, name: &str, args: &str) -> ProtocolEvent {
        ProtocolEvent::ToolCallDelta {
            index,
            id: Some(format!("call_{}", index)),
            name: Some(name.to_string()),
            arguments_fragment: Some(args.to_string()),
        }
    }

    fn kinds(frames: &[OutboundFrame]) -> Vec<String> {
        frames
            .iter()
            .map(|f| match f {
                OutboundFrame::ToolStatus { phase, name, .. } => format!("{}:{:?}", name, phase),
                other => other.kind().to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_text_then_finalize() {
        let provider = Arc::new(ScriptedProvider {
            script: Script::Events(vec![
                ProtocolEvent::text("Great talking. "),
                ProtocolEvent::text("Good luck "),
                ProtocolEvent::text("with the offer."),
                call(0, "complete_session", "{}"),
                ProtocolEvent::StreamEnd,
            ]),
            completion: r#"{"title":"Job Offer","facts":["Has an offer."],"summary":{"insights":[]}}"#
                .into(),
            contexts: Mutex::new(Vec::new()),
        });
        let store = Arc::new(MemoryStore::new());
        let dispatcher =
            ToolDispatcher::new(builtin_tools(provider.clone(), store.clone())).unwrap();
        let relay = Relay::new(provider.clone(), Arc::new(dispatcher), store.clone());

        let frames: Vec<OutboundFrame> = relay.run_turn("s1", "Thanks, bye!").collect().await;

        assert_eq!(
            kinds(&frames),
            vec![
                "content",
                "content",
                "content",
                "done",
                "complete_session:Executing",
                "complete_session:Completed",
            ]
        );
        let OutboundFrame::ToolStatus { result: Some(result), .. } = &frames[5] else {
            panic!("expected completed status, got {:?}", frames[5]);
        };
        assert_eq!(result["session"]["title"], "Job Offer");

        // The finalize tool saw the assistant reply from this same turn
        let history = store.read_history("s1").await.unwrap();
        assert_eq!(
            history,
            vec![
                Message::user("Thanks, bye!"),
                Message::assistant("Great talking. Good luck with the offer.")
            ]
        );

        let context = provider.contexts.lock()[0].clone();
        assert_eq!(context.messages, vec![Message::user("Thanks, bye!")]);
        assert_eq!(context.tools.len(), 4);
        assert!(context.system_prompt.unwrap().contains("<PAUSE>"));
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_and_continues() {
        let provider = ScriptedProvider::new(Script::Events(vec![
            ProtocolEvent::text("On it."),
            call(0, "launch_rockets", "{}"),
            call(1, "known", "{}"),
            ProtocolEvent::StreamEnd,
        ]));
        let (relay, _, log) = counting_relay(provider, &["known"]);

        let frames: Vec<OutboundFrame> = relay.run_turn("s", "go").collect().await;

        assert!(!frames.iter().any(|f| matches!(f, OutboundFrame::Error { .. })));
        assert_eq!(
            frames[3],
            OutboundFrame::completed(
                "launch_rockets",
                json!({"error": "Unknown tool: launch_rockets"})
            )
        );
        assert_eq!(
            frames[5],
            OutboundFrame::completed("known", json!({"ran": "known"}))
        );
        assert_eq!(*log.lock(), vec!["known"]);
    }

    #[tokio::test]
    async fn test_rejection_is_single_error_frame() {
        let provider = ScriptedProvider::new(Script::Reject(401));
        let (relay, store, _) = counting_relay(provider, &[]);

        let frames: Vec<OutboundFrame> = relay.run_turn("s", "hello").collect().await;

        assert_eq!(frames.len(), 1);
        let OutboundFrame::Error { message } = &frames[0] else {
            panic!("expected error frame");
        };
        assert!(message.contains("401"));
        // The user message was stored before the upstream call
        assert_eq!(store.read_history("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_interruption_keeps_partial_reply() {
        let provider = ScriptedProvider::new(Script::InterruptAfter(vec![
            ProtocolEvent::text("That's a big "),
            ProtocolEvent::text("decision."),
            call(0, "known", "{}"),
        ]));
        let (relay, store, log) = counting_relay(provider, &["known"]);

        let frames: Vec<OutboundFrame> = relay.run_turn("s", "Should I quit?").collect().await;

        assert_eq!(kinds(&frames), vec!["content", "content", "error"]);
        assert!(log.lock().is_empty());
        let history = store.read_history("s").await.unwrap();
        assert_eq!(history[1], Message::assistant("That's a big decision."));
    }

    #[tokio::test]
    async fn test_tool_only_turn_stores_no_reply() {
        let provider = ScriptedProvider::new(Script::Events(vec![
            call(0, "known", ""),
            ProtocolEvent::StreamEnd,
        ]));
        let (relay, store, _) = counting_relay(provider, &["known"]);

        let frames: Vec<OutboundFrame> = relay.run_turn("s", "notes please").collect().await;

        assert_eq!(kinds(&frames), vec!["done", "known:Executing", "known:Completed"]);
        assert_eq!(store.read_history("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_tools() {
        let provider = ScriptedProvider::new(Script::Events(vec![
            ProtocolEvent::text("Hi."),
            call(0, "known", "{}"),
            ProtocolEvent::StreamEnd,
        ]));
        let (relay, _, log) = counting_relay(provider, &["known"]);

        let mut frames = relay.run_turn("s", "hi");
        assert_eq!(frames.next().await, Some(OutboundFrame::content("Hi.")));
        drop(frames);
        assert!(log.lock().is_empty());
    }

    /// Small deterministic generator for turn simulations
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }
    }

    #[tokio::test]
    async fn test_frame_order_across_generated_turns() {
        let mut rng = Lcg(7);
        let names = ["t0", "t1", "t2"];

        for _ in 0..100 {
            let text_chunks = rng.next(4) as usize;
            let tool_count = rng.next(4) as u32;

            // Per-tool fragment queues, merged in random order
            let mut queues: Vec<Vec<ProtocolEvent>> = (0..tool_count)
                .map(|i| {
                    let name = if i == 2 && rng.next(2) == 0 {
                        "unknown"
                    } else {
                        names[i as usize]
                    };
                    vec![
                        ProtocolEvent::ToolCallDelta {
                            index: i,
                            id: Some(format!("c{}", i)),
                            name: Some(name.to_string()),
                            arguments_fragment: Some("{".into()),
                        },
                        ProtocolEvent::ToolCallDelta {
                            index: i,
                            id: None,
                            name: None,
                            arguments_fragment: Some("}".into()),
                        },
                    ]
                })
                .collect();
            let mut events: Vec<ProtocolEvent> = (0..text_chunks)
                .map(|i| ProtocolEvent::text(format!("chunk {}. ", i)))
                .collect();
            while queues.iter().any(|q| !q.is_empty()) {
                let live: Vec<usize> = (0..queues.len()).filter(|&i| !queues[i].is_empty()).collect();
                let pick = live[rng.next(live.len() as u64) as usize];
                events.push(queues[pick].remove(0));
            }
            events.push(ProtocolEvent::StreamEnd);

            let provider = ScriptedProvider::new(Script::Events(events));
            let (relay, _, _) = counting_relay(provider, &names);
            let frames: Vec<OutboundFrame> = relay.run_turn("s", "go").collect().await;

            let done_at: Vec<usize> = frames
                .iter()
                .enumerate()
                .filter(|(_, f)| matches!(f, OutboundFrame::Done))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(done_at, vec![text_chunks], "frames: {:?}", frames);
            assert!(
                frames[..text_chunks]
                    .iter()
                    .all(|f| matches!(f, OutboundFrame::Content { .. }))
            );

            let statuses = &frames[text_chunks + 1..];
            assert_eq!(statuses.len(), 2 * tool_count as usize);
            for (i, pair) in statuses.chunks(2).enumerate() {
                let (
                    OutboundFrame::ToolStatus { name: a, phase: ToolPhase::Executing, .. },
                    OutboundFrame::ToolStatus { name: b, phase: ToolPhase::Completed, result: Some(_) },
                ) = (&pair[0], &pair[1])
                else {
                    panic!("bad status pair: {:?}", pair);
                };
                assert_eq!(a, b);
                if a != "unknown" {
                    assert_eq!(a, names[i]);
                }
            }
        }
    }
}
