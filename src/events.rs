//! # Wire Messages
//!
//! JSON objects exchanged over the WebSocket endpoint. Every message carries a
//! `type` discriminator in snake_case.
//!
//! ## Server → Client:
//! - `{"type":"transcript","text":"..."}`: raw recognized speech
//! - `{"type":"state_change","state":"idle"|"listening"}`
//! - `{"type":"assistant_question","text":"..."}`: next prompt or closing message
//! - `{"type":"user_answer","text":"..."}`: an accepted answer
//!
//! ## Client → Server:
//! - `{"type":"text_input","text":"..."}`: typed answer, bypasses audio

use crate::conversation::ConversationState;
use serde::{Deserialize, Serialize};

/// Event produced by the conversation and fanned out to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Transcript { text: String },
    StateChange { state: ConversationState },
    AssistantQuestion { text: String },
    UserAnswer { text: String },
}

impl OutboundEvent {
    pub fn transcript(text: impl Into<String>) -> Self {
        Self::Transcript { text: text.into() }
    }

    pub fn state_change(state: ConversationState) -> Self {
        Self::StateChange { state }
    }

    pub fn assistant_question(text: impl Into<String>) -> Self {
        Self::AssistantQuestion { text: text.into() }
    }

    pub fn user_answer(text: impl Into<String>) -> Self {
        Self::UserAnswer { text: text.into() }
    }

    /// Serialize to the JSON text frame sent to clients.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Message accepted from a client.
///
/// Anything with an unrecognized `type` deserializes to `Unknown` so it can be
/// ignored without treating it as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    TextInput { text: String },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame. Invalid JSON or missing fields yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_event_wire_format() {
        let value: serde_json::Value =
            serde_json::from_str(&OutboundEvent::transcript("hey assistant").to_json().unwrap())
                .unwrap();
        assert_eq!(value, json!({"type": "transcript", "text": "hey assistant"}));

        let value: serde_json::Value = serde_json::from_str(
            &OutboundEvent::state_change(ConversationState::Listening)
                .to_json()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(value, json!({"type": "state_change", "state": "listening"}));

        let value: serde_json::Value =
            serde_json::from_str(&OutboundEvent::assistant_question("color?").to_json().unwrap())
                .unwrap();
        assert_eq!(value, json!({"type": "assistant_question", "text": "color?"}));

        let value: serde_json::Value =
            serde_json::from_str(&OutboundEvent::user_answer("red").to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "user_answer", "text": "red"}));
    }

    #[test]
    fn test_client_message_parsing() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"text_input","text":"blue"}"#),
            Some(ClientMessage::TextInput { text: "blue".to_string() })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe","channel":"all"}"#),
            Some(ClientMessage::Unknown)
        );
    }

    #[test]
    fn test_malformed_client_messages_are_rejected() {
        assert_eq!(ClientMessage::parse("not json"), None);
        assert_eq!(ClientMessage::parse(r#"{"type":"text_input"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"text":"no type"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"type":"text_input","text":5}"#), None);
    }
}
