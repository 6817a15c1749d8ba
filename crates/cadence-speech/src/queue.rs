//! Cancellable speech playback queue
//!
//! Segmentation pushes segments; a single consumer task plays them one at a
//! time in arrival order. Every mutation (enqueue, dequeue, clear on stop)
//! happens under one lock, so a stop can never race with an enqueue into a
//! half-cleared queue.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::segment::SpeechSegment;
use crate::speaker::Speaker;

/// Turn-level playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// Nothing to play
    Idle,
    /// Text is still arriving
    Streaming,
    /// Text is complete; queued segments are still playing
    Draining,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<SpeechSegment>,
    /// Cancels the segment currently playing
    playing: Option<CancellationToken>,
    consumer_active: bool,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Wakes the consumer when work arrives or the queue closes
    wake: Notify,
    phase: watch::Sender<PlaybackPhase>,
}

impl Shared {
    fn set_phase(&self, phase: PlaybackPhase) {
        self.phase.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });
    }

    fn phase(&self) -> PlaybackPhase {
        *self.phase.borrow()
    }

    /// Draining with nothing left means the turn is over. Caller holds the lock.
    fn settle(&self, state: &QueueState) {
        if self.phase() == PlaybackPhase::Draining
            && state.pending.is_empty()
            && state.playing.is_none()
        {
            self.set_phase(PlaybackPhase::Idle);
        }
    }
}

/// Handle to a playback queue; clones share the same queue
#[derive(Clone)]
pub struct SpeechQueue {
    shared: Arc<Shared>,
}

impl Default for SpeechQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechQueue {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(PlaybackPhase::Idle);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                wake: Notify::new(),
                phase,
            }),
        }
    }

    /// Spawn the single playback consumer.
    ///
    /// Fails with `ConsumerActive` if one is already running.
    pub fn start(&self, speaker: Arc<dyn Speaker>) -> Result<JoinHandle<()>> {
        {
            let mut state = self.shared.state.lock();
            if state.consumer_active {
                return Err(Error::ConsumerActive);
            }
            state.consumer_active = true;
            state.closed = false;
        }
        let shared = self.shared.clone();
        Ok(tokio::spawn(run_consumer(shared, speaker)))
    }

    /// Text for a new turn has started arriving
    pub fn begin_turn(&self) {
        let _state = self.shared.state.lock();
        self.shared.set_phase(PlaybackPhase::Streaming);
    }

    /// No more segments will be enqueued for this turn
    pub fn finish_turn(&self) {
        let state = self.shared.state.lock();
        if self.shared.phase() == PlaybackPhase::Streaming {
            self.shared.set_phase(PlaybackPhase::Draining);
        }
        self.shared.settle(&state);
    }

    /// Append a segment
    pub fn enqueue(&self, segment: SpeechSegment) {
        self.shared.state.lock().pending.push_back(segment);
        self.shared.wake.notify_one();
    }

    /// Clear unplayed segments, halt the current one and go idle.
    ///
    /// Safe to call when nothing is playing.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        if let Some(playing) = state.playing.take() {
            playing.cancel();
        }
        self.shared.set_phase(PlaybackPhase::Idle);
        tracing::debug!("Speech stopped, {} queued segment(s) dropped", dropped);
    }

    /// Stop playback and let the consumer task exit
    pub fn close(&self) {
        self.stop();
        self.shared.state.lock().closed = true;
        self.shared.wake.notify_one();
    }

    /// Current playback phase
    pub fn phase(&self) -> PlaybackPhase {
        self.shared.phase()
    }

    /// Number of segments waiting to be played
    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Whether no segment is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a segment is playing right now
    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().playing.is_some()
    }

    /// Resolve once the phase is `Idle`
    pub async fn wait_idle(&self) {
        let mut phase = self.shared.phase.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = phase.wait_for(|p| *p == PlaybackPhase::Idle).await;
    }
}

async fn run_consumer(shared: Arc<Shared>, speaker: Arc<dyn Speaker>) {
    tracing::debug!("Speech consumer started");
    loop {
        let next = {
            let mut state = shared.state.lock();
            if state.closed {
                state.consumer_active = false;
                break;
            }
            match state.pending.pop_front() {
                Some(segment) => {
                    let token = CancellationToken::new();
                    state.playing = Some(token.clone());
                    Some((segment, token))
                }
                None => None,
            }
        };

        let Some((segment, token)) = next else {
            shared.wake.notified().await;
            continue;
        };

        play(speaker.as_ref(), &segment, &token).await;

        let mut state = shared.state.lock();
        // A stop during playback has already taken the token
        if !token.is_cancelled() {
            state.playing = None;
        }
        shared.settle(&state);
    }
    tracing::debug!("Speech consumer stopped");
}

async fn play(speaker: &dyn Speaker, segment: &SpeechSegment, cancel: &CancellationToken) {
    match segment {
        SpeechSegment::Speech { text } => {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Speech interrupted");
                }
                result = speaker.speak(text) => {
                    if let Err(e) = result {
                        tracing::warn!("{}; skipping segment", e);
                    }
                }
            }
        }
        SpeechSegment::Pause { duration_ms } => {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(Duration::from_millis(*duration_ms)) => {}
            }
        }
    }
}
