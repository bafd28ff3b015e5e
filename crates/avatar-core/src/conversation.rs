//! Conversation data model: messages, append-only history, turn state, and energy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    role: Role,
    content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered, append-only conversation history. The exclusive input to the completion
/// service; it only grows for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<ConversationMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// True when roles alternate user/assistant starting with the user.
    /// A trailing user message (reply still pending) is allowed.
    pub fn is_alternating(&self) -> bool {
        self.messages.iter().enumerate().all(|(i, m)| {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            m.role() == expected
        })
    }
}

/// State of the turn-taking state machine. Exactly one value at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Listening,
    AwaitingReply,
    Speaking,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Listening => "listening",
            ConversationState::AwaitingReply => "awaiting_reply",
            ConversationState::Speaking => "speaking",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cosmetic energy meter in [0, 100]. Drained by user turns, restored by spoken replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnergyLevel(u8);

impl EnergyLevel {
    pub const MAX: u8 = 100;

    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    pub fn full() -> Self {
        Self(Self::MAX)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Fill ratio in [0.0, 1.0] for meters.
    pub fn fraction(&self) -> f32 {
        f32::from(self.0) / f32::from(Self::MAX)
    }

    pub fn drain(&mut self, amount: u8) {
        self.0 = self.0.saturating_sub(amount);
    }

    pub fn restore(&mut self, amount: u8) {
        self.0 = self.0.saturating_add(amount).min(Self::MAX);
    }
}

impl Default for EnergyLevel {
    fn default() -> Self {
        Self::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ConversationMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn history_alternation() {
        let mut history = ConversationHistory::new();
        assert!(history.is_alternating());
        history.push(ConversationMessage::user("hello"));
        assert!(history.is_alternating());
        history.push(ConversationMessage::assistant("hi there"));
        history.push(ConversationMessage::user("how are you?"));
        assert!(history.is_alternating());
        assert_eq!(history.len(), 3);

        history.push(ConversationMessage::user("anyone?"));
        assert!(!history.is_alternating());
    }

    #[test]
    fn history_starting_with_assistant_is_not_alternating() {
        let mut history = ConversationHistory::new();
        history.push(ConversationMessage::assistant("unprompted"));
        assert!(!history.is_alternating());
    }

    #[test]
    fn energy_clamps() {
        let mut energy = EnergyLevel::default();
        assert_eq!(energy.value(), 100);
        energy.restore(20);
        assert_eq!(energy.value(), 100);
        for _ in 0..15 {
            energy.drain(10);
        }
        assert_eq!(energy.value(), 0);
        energy.restore(20);
        assert_eq!(energy.value(), 20);
        assert!((energy.fraction() - 0.2).abs() < f32::EPSILON);
        assert_eq!(EnergyLevel::new(250).value(), 100);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConversationState::AwaitingReply.to_string(), "awaiting_reply");
    }
}
