//! Terminal client: one turn against a running relay

use anyhow::Context as _;
use cadence_agent::{OutboundFrame, ToolPhase};
use cadence_speech::{CommandSpeaker, Narrator, RelayClient, SpeechQueue};
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::Config;

/// Longest tool result shown inline
const RESULT_PREVIEW_CHARS: usize = 200;

pub struct ChatOptions {
    pub relay_url: String,
    pub session_id: Option<String>,
    pub mute: bool,
    pub message: String,
}

/// Narrator plus the playback task behind it
struct Voice {
    narrator: Narrator,
    queue: SpeechQueue,
    consumer: JoinHandle<()>,
}

impl Voice {
    fn start(config: &Config) -> anyhow::Result<Self> {
        let speaker = CommandSpeaker::new(&config.speak_command)?;
        tracing::debug!("Speaking with {}", speaker.program());
        let queue = SpeechQueue::new();
        let consumer = queue.start(Arc::new(speaker))?;
        Ok(Self {
            narrator: Narrator::new(queue.clone(), Duration::from_millis(config.pause_ms)),
            queue,
            consumer,
        })
    }

    /// Let queued speech finish unless Ctrl-C arrives first
    async fn drain(mut self) {
        tokio::select! {
            () = self.narrator.wait_idle() => {}
            _ = tokio::signal::ctrl_c() => self.narrator.stop(),
        }
        self.queue.close();
        if let Err(e) = self.consumer.await {
            tracing::warn!("Speech task failed: {}", e);
        }
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Bracketed status line for frames that are not reply text
pub fn status_line(frame: &OutboundFrame) -> Option<String> {
    match frame {
        OutboundFrame::Content { .. } | OutboundFrame::Done => None,
        OutboundFrame::ToolStatus {
            name,
            phase: ToolPhase::Executing,
            ..
        } => Some(format!("[Running {}...]", name)),
        OutboundFrame::ToolStatus { name, result, .. } => {
            let result = result.clone().unwrap_or_default();
            match result.get("error").and_then(|e| e.as_str()) {
                Some(error) => Some(format!("[{} failed: {}]", name, error)),
                None => Some(format!(
                    "[{}: {}]",
                    name,
                    truncate_chars(&result.to_string(), RESULT_PREVIEW_CHARS)
                )),
            }
        }
        OutboundFrame::Error { message } => Some(format!("Error: {}", message)),
    }
}

/// Send one message, print the reply as it streams and speak it
pub async fn run(config: &Config, options: ChatOptions) -> anyhow::Result<()> {
    let session_id = options
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    eprintln!("[session {}]", session_id);

    let mut voice = if options.mute {
        None
    } else {
        Some(Voice::start(config)?)
    };

    let client = RelayClient::new(&options.relay_url);
    let mut frames = client
        .send(&session_id, &options.message)
        .await
        .with_context(|| format!("Relay at {} refused the message", options.relay_url))?;

    if let Some(voice) = voice.as_mut() {
        voice.narrator.begin_turn();
    }

    let mut failure = None;
    loop {
        tokio::select! {
            next = frames.next() => {
                let frame = match next {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => OutboundFrame::error(format!("Connection to relay lost: {}", e)),
                    None => {
                        if let Some(voice) = voice.as_mut() {
                            voice.narrator.end_of_stream();
                        }
                        break;
                    }
                };

                match &frame {
                    OutboundFrame::Content { text } => {
                        print!("{}", text);
                        let _ = std::io::stdout().flush();
                    }
                    OutboundFrame::Done => println!(),
                    other => {
                        if let Some(line) = status_line(other) {
                            eprintln!("{}", line);
                        }
                    }
                }
                if let Some(voice) = voice.as_mut() {
                    voice.narrator.on_frame(&frame);
                }
                if let OutboundFrame::Error { message } = frame {
                    failure = Some(message);
                    break;
                }
            }
            // Silences the reply; text keeps streaming
            _ = tokio::signal::ctrl_c() => {
                match voice.as_mut() {
                    Some(voice) => {
                        voice.narrator.stop();
                        eprintln!("\n[speech stopped]");
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(voice) = voice {
        voice.drain().await;
    }

    match failure {
        Some(message) => anyhow::bail!("Turn failed: {}", message),
        None => Ok(()),
    }
}
