//! # Recognition Loop
//!
//! Single consumer of the frame queue. Runs on its own OS thread because both
//! the blocking dequeue and Whisper inference would stall the event loop.
//!
//! Every finalized utterance goes into the conversation as speech. The loop
//! ends when the frame source closes the queue (after flushing the
//! recognizer) or when the recognizer fails. A failure stops recognition only;
//! the WebSocket server keeps running.

use crate::audio::queue::FrameReceiver;
use crate::conversation::{ConversationHandle, UtteranceSource};
use crate::error::{AppError, AppResult};
use crate::transcription::SpeechRecognizer;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Start the loop on a dedicated thread.
pub fn spawn_recognition_loop<R>(
    recognizer: R,
    frames: FrameReceiver,
    conversation: ConversationHandle,
) -> AppResult<JoinHandle<()>>
where
    R: SpeechRecognizer + 'static,
{
    thread::Builder::new()
        .name("recognition".to_string())
        .spawn(move || match run_recognition_loop(recognizer, frames, conversation) {
            Ok(()) => info!("Recognition loop finished"),
            Err(err) => error!("Recognition stopped: {}", err),
        })
        .map_err(|e| AppError::Recognizer(format!("failed to spawn recognition thread: {}", e)))
}

/// Drain frames until the queue closes or the recognizer fails.
pub fn run_recognition_loop<R: SpeechRecognizer>(
    mut recognizer: R,
    frames: FrameReceiver,
    conversation: ConversationHandle,
) -> AppResult<()> {
    info!("Recognition loop started");

    while let Ok(frame) = frames.recv() {
        let utterance = recognizer
            .feed(&frame)
            .map_err(|e| AppError::Recognizer(format!("{:#}", e)))?;

        if let Some(text) = utterance {
            dispatch(&conversation, &text);
        }
    }

    info!("Audio stream ended, flushing recognizer");
    let remaining = recognizer
        .finish()
        .map_err(|e| AppError::Recognizer(format!("{:#}", e)))?;
    for text in remaining {
        dispatch(&conversation, &text);
    }

    Ok(())
}

fn dispatch(conversation: &ConversationHandle, text: &str) {
    let events = conversation.handle_utterance(text, UtteranceSource::Speech);
    debug!("Utterance '{}' produced {} event(s)", text, events);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::AudioFrame;
    use crate::audio::queue::{frame_queue, OverflowPolicy};
    use crate::conversation::{Conversation, ConversationState, QuestionSet};
    use crate::events::OutboundEvent;
    use anyhow::{anyhow, Result};
    use std::collections::VecDeque;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    /// Plays back one scripted result per frame.
    struct ScriptedRecognizer {
        per_frame: VecDeque<Result<Option<String>>>,
        on_finish: Vec<String>,
    }

    impl ScriptedRecognizer {
        fn new(per_frame: Vec<Result<Option<String>>>, on_finish: Vec<&str>) -> Self {
            Self {
                per_frame: per_frame.into(),
                on_finish: on_finish.into_iter().map(String::from).collect(),
            }
        }
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn feed(&mut self, _frame: &AudioFrame) -> Result<Option<String>> {
            self.per_frame.pop_front().unwrap_or(Ok(None))
        }

        fn finish(&mut self) -> Result<Vec<String>> {
            Ok(std::mem::take(&mut self.on_finish))
        }
    }

    fn conversation() -> (ConversationHandle, UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conversation = Conversation::new(
            "hey assistant",
            QuestionSet::new(vec!["color?".to_string(), "food?".to_string()], "Thanks!"),
        );
        (ConversationHandle::new(conversation, tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn queue_with(frames: usize) -> FrameReceiver {
        let (tx, rx) = frame_queue(frames.max(1), OverflowPolicy::DropOldest);
        for _ in 0..frames {
            tx.push(AudioFrame::from_samples(&[0; 4]));
        }
        rx
    }

    #[test]
    fn test_utterances_drive_the_conversation() {
        let (handle, mut events) = conversation();
        let recognizer = ScriptedRecognizer::new(
            vec![Ok(None), Ok(Some("hey assistant".to_string())), Ok(None), Ok(Some("red".to_string()))],
            vec!["pizza"],
        );

        run_recognition_loop(recognizer, queue_with(4), handle.clone()).unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                OutboundEvent::transcript("hey assistant"),
                OutboundEvent::state_change(ConversationState::Listening),
                OutboundEvent::assistant_question("color?"),
                OutboundEvent::transcript("red"),
                OutboundEvent::user_answer("red"),
                OutboundEvent::assistant_question("food?"),
                OutboundEvent::transcript("pizza"),
                OutboundEvent::user_answer("pizza"),
                OutboundEvent::assistant_question("Thanks!"),
                OutboundEvent::state_change(ConversationState::Idle),
            ]
        );
        assert_eq!(handle.current_state(), ConversationState::Idle);
    }

    #[test]
    fn test_empty_utterances_emit_nothing() {
        let (handle, mut events) = conversation();
        let recognizer = ScriptedRecognizer::new(vec![Ok(Some("   ".to_string()))], vec![""]);

        run_recognition_loop(recognizer, queue_with(1), handle).unwrap();
        assert!(drain(&mut events).is_empty());
    }

    #[test]
    fn test_recognizer_error_stops_the_loop() {
        let (handle, mut events) = conversation();
        let recognizer = ScriptedRecognizer::new(
            vec![Err(anyhow!("decoder crashed")), Ok(Some("hey assistant".to_string()))],
            vec![],
        );

        let err = run_recognition_loop(recognizer, queue_with(2), handle.clone()).unwrap_err();
        assert!(matches!(err, AppError::Recognizer(_)));
        assert!(err.to_string().contains("decoder crashed"));
        assert!(drain(&mut events).is_empty());
        assert_eq!(handle.current_state(), ConversationState::Idle);
    }

    #[test]
    fn test_spawned_loop_ends_with_the_stream() {
        let (handle, mut events) = conversation();
        let (tx, rx) = frame_queue(4, OverflowPolicy::DropOldest);
        let recognizer = ScriptedRecognizer::new(vec![Ok(Some("hey assistant".to_string()))], vec![]);

        let worker = spawn_recognition_loop(recognizer, rx, handle).unwrap();
        tx.push(AudioFrame::from_samples(&[0; 4]));
        drop(tx);
        worker.join().unwrap();

        assert_eq!(drain(&mut events).len(), 3);
    }
}
