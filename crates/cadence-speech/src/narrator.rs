//! Per-turn speech driver
//!
//! Feeds `Content` text through the segmenter into the playback queue while
//! the turn is still streaming, so speech starts with the first sentence.

use cadence_agent::OutboundFrame;
use std::time::Duration;

use crate::queue::{PlaybackPhase, SpeechQueue};
use crate::segment::Segmenter;

/// Turns the outbound frames of a turn into queued speech
pub struct Narrator {
    segmenter: Segmenter,
    queue: SpeechQueue,
    /// Set by `stop`; the rest of the turn is not spoken
    silenced: bool,
}

impl Narrator {
    pub fn new(queue: SpeechQueue, pause: Duration) -> Self {
        Self {
            segmenter: Segmenter::new(pause),
            queue,
            silenced: false,
        }
    }

    /// Prepare for a new turn, undoing an earlier `stop`
    pub fn begin_turn(&mut self) {
        self.segmenter.reset();
        self.silenced = false;
        self.queue.begin_turn();
    }

    /// Handle one frame of the current turn
    pub fn on_frame(&mut self, frame: &OutboundFrame) {
        match frame {
            OutboundFrame::Content { text } => {
                if self.silenced {
                    return;
                }
                if self.queue.phase() == PlaybackPhase::Idle {
                    self.queue.begin_turn();
                }
                for segment in self.segmenter.push(text) {
                    self.queue.enqueue(segment);
                }
            }
            // A partial reply is still spoken in full
            OutboundFrame::Done | OutboundFrame::Error { .. } => self.finish(),
            OutboundFrame::ToolStatus { .. } => {}
        }
    }

    fn finish(&mut self) {
        if !self.silenced {
            for segment in self.segmenter.finish() {
                self.queue.enqueue(segment);
            }
        }
        self.queue.finish_turn();
    }

    /// The relay closed the stream. Text still pending is spoken as if
    /// `Done` had arrived; a no-op once the turn has already finished.
    pub fn end_of_stream(&mut self) {
        if self.queue.phase() == PlaybackPhase::Streaming || !self.segmenter.pending().is_empty() {
            self.finish();
        }
    }

    /// Silence the rest of this turn
    pub fn stop(&mut self) {
        self.silenced = true;
        self.segmenter.reset();
        self.queue.stop();
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackPhase {
        self.queue.phase()
    }

    /// Resolve once everything queued has played (or was stopped)
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::MockSpeaker;
    use crate::segment::DEFAULT_PAUSE;
    use serde_json::json;
    use std::sync::Arc;

    fn narrator(delay: Duration) -> (Narrator, Arc<MockSpeaker>) {
        let speaker = MockSpeaker::new(delay);
        let queue = SpeechQueue::new();
        queue.start(speaker.clone()).unwrap();
        (Narrator::new(queue, DEFAULT_PAUSE), speaker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaks_while_streaming() {
        let (mut narrator, speaker) = narrator(Duration::from_millis(200));
        assert_eq!(narrator.state(), PlaybackPhase::Idle);

        narrator.on_frame(&OutboundFrame::content("That's interesting. "));
        assert_eq!(narrator.state(), PlaybackPhase::Streaming);

        // First sentence starts before the turn is done
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*speaker.started.lock(), vec!["That's interesting."]);

        narrator.on_frame(&OutboundFrame::content("<PAUSE> What's "));
        narrator.on_frame(&OutboundFrame::content("driving that?"));
        narrator.on_frame(&OutboundFrame::Done);
        assert_eq!(narrator.state(), PlaybackPhase::Draining);

        narrator.on_frame(&OutboundFrame::completed("complete_session", json!({})));
        narrator.wait_idle().await;
        assert_eq!(narrator.state(), PlaybackPhase::Idle);
        assert_eq!(
            *speaker.finished.lock(),
            vec!["That's interesting.", "What's driving that?"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_flushes_partial_reply() {
        let (mut narrator, speaker) = narrator(Duration::from_millis(10));
        narrator.on_frame(&OutboundFrame::content("I was saying"));
        narrator.on_frame(&OutboundFrame::error("Upstream stream interrupted"));
        narrator.wait_idle().await;
        assert_eq!(*speaker.finished.lock(), vec!["I was saying"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_silences_rest_of_turn() {
        let (mut narrator, speaker) = narrator(Duration::from_secs(1));
        narrator.on_frame(&OutboundFrame::content("One. Two. "));
        tokio::time::sleep(Duration::from_millis(10)).await;

        narrator.stop();
        assert_eq!(narrator.state(), PlaybackPhase::Idle);

        narrator.on_frame(&OutboundFrame::content("Three. "));
        narrator.on_frame(&OutboundFrame::Done);
        narrator.wait_idle().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*speaker.started.lock(), vec!["One."]);
        assert!(speaker.finished.lock().is_empty());

        // The next turn speaks again
        narrator.begin_turn();
        narrator.on_frame(&OutboundFrame::content("Back."));
        narrator.on_frame(&OutboundFrame::Done);
        narrator.wait_idle().await;
        assert_eq!(*speaker.finished.lock(), vec!["Back."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_closed_without_done_flushes() {
        let (mut narrator, speaker) = narrator(Duration::from_millis(100));
        narrator.begin_turn();
        narrator.on_frame(&OutboundFrame::content("First sentence. And a trailing clause"));
        narrator.end_of_stream();
        assert_eq!(narrator.state(), PlaybackPhase::Draining);

        tokio::time::timeout(Duration::from_secs(60), narrator.wait_idle())
            .await
            .unwrap();
        assert_eq!(
            *speaker.finished.lock(),
            vec!["First sentence.", "And a trailing clause"]
        );

        // Closing after a regular Done changes nothing
        narrator.end_of_stream();
        assert_eq!(narrator.state(), PlaybackPhase::Idle);
        assert_eq!(speaker.finished.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_without_text_is_idle() {
        let (mut narrator, _) = narrator(Duration::ZERO);
        narrator.begin_turn();
        narrator.on_frame(&OutboundFrame::Done);
        assert_eq!(narrator.state(), PlaybackPhase::Idle);
    }
}
