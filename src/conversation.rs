//! # Conversation State Machine
//!
//! A single scripted dialogue shared by every client:
//!
//! ```text
//!   Idle --(speech containing wake phrase)--> Listening
//!   Listening --(answer, questions remain)--> Listening
//!   Listening --(answer to last question)---> Idle
//! ```
//!
//! `Conversation` is pure logic: it consumes utterance text and returns the
//! events to broadcast. `ConversationHandle` puts it behind a mutex and pushes
//! the events into the hub's channel while the lock is held, so the order
//! clients observe always matches the order of transitions.

use crate::config::ConversationConfig;
use crate::events::OutboundEvent;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Dialogue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    /// Waiting for the wake phrase
    Idle,
    /// Walking through the question list
    Listening,
    /// Reserved for a future thinking phase; no transition enters it
    Processing,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Listening => "listening",
            ConversationState::Processing => "processing",
        }
    }
}

/// Where an utterance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceSource {
    /// Finalized by the speech recognizer
    Speech,
    /// Typed by a client over the WebSocket
    TextInput,
}

/// Ordered, read-only list of prompts plus the message that ends a run.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    questions: Vec<String>,
    closing_message: String,
}

impl QuestionSet {
    pub fn new(questions: Vec<String>, closing_message: impl Into<String>) -> Self {
        Self {
            questions,
            closing_message: closing_message.into(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn closing_message(&self) -> &str {
        &self.closing_message
    }
}

/// The process-wide conversation.
#[derive(Debug)]
pub struct Conversation {
    state: ConversationState,
    /// Index of the outstanding question. `Some` only while listening.
    cursor: Option<usize>,
    /// Stored lowercase
    wake_phrase: String,
    questions: QuestionSet,
}

impl Conversation {
    pub fn new(wake_phrase: &str, questions: QuestionSet) -> Self {
        Self {
            state: ConversationState::Idle,
            cursor: None,
            wake_phrase: wake_phrase.trim().to_lowercase(),
            questions,
        }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(
            &config.wake_phrase,
            QuestionSet::new(config.questions.clone(), config.closing_message.clone()),
        )
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Apply one utterance and return the events it produced, in order.
    ///
    /// Blank input is dropped before anything else and never changes state.
    pub fn handle_utterance(&mut self, text: &str, source: UtteranceSource) -> Vec<OutboundEvent> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();
        if source == UtteranceSource::Speech {
            events.push(OutboundEvent::transcript(text));
        }

        match self.state {
            ConversationState::Idle => {
                if source == UtteranceSource::Speech && self.is_wake(text) {
                    self.start(&mut events);
                } else if source == UtteranceSource::TextInput {
                    debug!("Ignoring text input while idle");
                }
            }
            ConversationState::Listening => self.answer(text, &mut events),
            ConversationState::Processing => {
                debug!("Utterance ignored while processing");
            }
        }

        events
    }

    fn is_wake(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.wake_phrase)
    }

    fn start(&mut self, events: &mut Vec<OutboundEvent>) {
        let Some(first) = self.questions.get(0) else {
            return;
        };

        info!("Wake phrase detected, starting conversation");
        self.state = ConversationState::Listening;
        self.cursor = Some(0);
        events.push(OutboundEvent::state_change(ConversationState::Listening));
        events.push(OutboundEvent::assistant_question(first));
    }

    fn answer(&mut self, text: &str, events: &mut Vec<OutboundEvent>) {
        events.push(OutboundEvent::user_answer(text));

        let next = self.cursor.map_or(0, |cursor| cursor + 1);
        match self.questions.get(next) {
            Some(question) => {
                self.cursor = Some(next);
                events.push(OutboundEvent::assistant_question(question));
            }
            None => {
                info!("All {} questions answered, returning to idle", self.questions.len());
                events.push(OutboundEvent::assistant_question(self.questions.closing_message()));
                self.state = ConversationState::Idle;
                self.cursor = None;
                events.push(OutboundEvent::state_change(ConversationState::Idle));
            }
        }
    }
}

/// Shared entry point into the conversation.
///
/// Cloned into the recognition thread and into every WebSocket actor.
#[derive(Clone)]
pub struct ConversationHandle {
    inner: Arc<Mutex<Conversation>>,
    events: UnboundedSender<OutboundEvent>,
}

impl ConversationHandle {
    pub fn new(conversation: Conversation, events: UnboundedSender<OutboundEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conversation)),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Conversation> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply an utterance and publish the resulting events.
    ///
    /// Returns how many events were produced.
    pub fn handle_utterance(&self, text: &str, source: UtteranceSource) -> usize {
        let mut conversation = self.lock();
        let events = conversation.handle_utterance(text, source);
        let count = events.len();
        debug!(
            "Conversation {} (cursor {:?}) after {:?} input",
            conversation.state().as_str(),
            conversation.cursor(),
            source
        );

        for event in events {
            if self.events.send(event).is_err() {
                warn!("Event channel closed, dropping conversation event");
                break;
            }
        }

        count
    }

    pub fn current_state(&self) -> ConversationState {
        self.lock().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn scenario() -> Conversation {
        Conversation::new(
            "Hey Assistant",
            QuestionSet::new(vec!["color?".to_string(), "food?".to_string()], "Thanks!"),
        )
    }

    #[test]
    fn test_idle_without_wake_phrase_only_transcribes() {
        let mut conversation = scenario();

        let events = conversation.handle_utterance("good morning", UtteranceSource::Speech);
        assert_eq!(events, vec![OutboundEvent::transcript("good morning")]);
        assert_eq!(conversation.state(), ConversationState::Idle);
        assert_eq!(conversation.cursor(), None);
    }

    #[test]
    fn test_full_scenario() {
        let mut conversation = scenario();

        let events = conversation.handle_utterance("well HEY assistant there", UtteranceSource::Speech);
        assert_eq!(
            events,
            vec![
                OutboundEvent::transcript("well HEY assistant there"),
                OutboundEvent::state_change(ConversationState::Listening),
                OutboundEvent::assistant_question("color?"),
            ]
        );
        assert_eq!(conversation.cursor(), Some(0));

        let events = conversation.handle_utterance("red", UtteranceSource::TextInput);
        assert_eq!(
            events,
            vec![
                OutboundEvent::user_answer("red"),
                OutboundEvent::assistant_question("food?"),
            ]
        );
        assert_eq!(conversation.cursor(), Some(1));

        let events = conversation.handle_utterance("pizza", UtteranceSource::Speech);
        assert_eq!(
            events,
            vec![
                OutboundEvent::transcript("pizza"),
                OutboundEvent::user_answer("pizza"),
                OutboundEvent::assistant_question("Thanks!"),
                OutboundEvent::state_change(ConversationState::Idle),
            ]
        );
        assert_eq!(conversation.state(), ConversationState::Idle);
        assert_eq!(conversation.cursor(), None);
    }

    #[test]
    fn test_blank_utterances_change_nothing() {
        let mut conversation = scenario();

        for source in [UtteranceSource::Speech, UtteranceSource::TextInput] {
            assert!(conversation.handle_utterance("", source).is_empty());
            assert!(conversation.handle_utterance("  \t ", source).is_empty());
        }
        assert_eq!(conversation.state(), ConversationState::Idle);

        conversation.handle_utterance("hey assistant", UtteranceSource::Speech);
        for source in [UtteranceSource::Speech, UtteranceSource::TextInput] {
            assert!(conversation.handle_utterance("   ", source).is_empty());
        }
        assert_eq!(conversation.state(), ConversationState::Listening);
        assert_eq!(conversation.cursor(), Some(0));
    }

    #[test]
    fn test_text_input_never_wakes() {
        let mut conversation = scenario();

        let events = conversation.handle_utterance("hey assistant", UtteranceSource::TextInput);
        assert!(events.is_empty());
        assert_eq!(conversation.state(), ConversationState::Idle);
    }

    #[test]
    fn test_wake_phrase_while_listening_is_an_answer() {
        let mut conversation = scenario();
        conversation.handle_utterance("hey assistant", UtteranceSource::Speech);

        let events = conversation.handle_utterance("hey assistant", UtteranceSource::Speech);
        assert_eq!(events[1], OutboundEvent::user_answer("hey assistant"));
        assert_eq!(events[2], OutboundEvent::assistant_question("food?"));
    }

    #[test]
    fn test_conversation_restarts_after_completion() {
        let mut conversation = scenario();
        for text in ["hey assistant", "red", "pizza"] {
            conversation.handle_utterance(text, UtteranceSource::Speech);
        }

        let events = conversation.handle_utterance("hey assistant again", UtteranceSource::Speech);
        assert_eq!(events[2], OutboundEvent::assistant_question("color?"));
        assert_eq!(conversation.cursor(), Some(0));
    }

    #[test]
    fn test_single_question_run() {
        let mut conversation = Conversation::new(
            "wake up",
            QuestionSet::new(vec!["only?".to_string()], "bye"),
        );
        conversation.handle_utterance("wake up", UtteranceSource::Speech);

        let events = conversation.handle_utterance("yes", UtteranceSource::TextInput);
        assert_eq!(
            events,
            vec![
                OutboundEvent::user_answer("yes"),
                OutboundEvent::assistant_question("bye"),
                OutboundEvent::state_change(ConversationState::Idle),
            ]
        );
    }

    #[test]
    fn test_handle_publishes_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConversationHandle::new(scenario(), tx);

        assert_eq!(handle.handle_utterance("hey assistant", UtteranceSource::Speech), 3);
        assert_eq!(handle.current_state(), ConversationState::Listening);

        assert_eq!(rx.try_recv().unwrap(), OutboundEvent::transcript("hey assistant"));
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundEvent::state_change(ConversationState::Listening)
        );
        assert_eq!(rx.try_recv().unwrap(), OutboundEvent::assistant_question("color?"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ConversationHandle::new(scenario(), tx);

        handle.handle_utterance("hey assistant", UtteranceSource::Speech);
        assert_eq!(handle.current_state(), ConversationState::Listening);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ConversationState::Listening).unwrap(),
            "\"listening\""
        );
        assert_eq!(ConversationState::Idle.as_str(), "idle");
    }
}
