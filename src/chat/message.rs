//! Chat messages and message identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Message identifier derived from the creation time in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out strictly increasing message ids based on wall-clock milliseconds
///
/// Two messages created within the same millisecond get consecutive ids.
#[derive(Debug, Default)]
pub struct IdClock {
    last: Option<i64>,
}

impl IdClock {
    pub fn next_id(&mut self) -> MessageId {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    fn next_at(&mut self, now_millis: i64) -> MessageId {
        let id = match self.last {
            Some(last) if now_millis <= last => last + 1,
            _ => now_millis,
        };
        self.last = Some(id);
        MessageId(id)
    }
}

/// A single entry in the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub const fn new(id: MessageId, role: Role, content: String) -> Self {
        Self { id, role, content }
    }

    /// The role/content pair sent to the chat endpoint
    #[must_use]
    pub fn to_history(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Wire form of a message in the chat request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_clock() {
        let mut clock = IdClock::default();
        assert_eq!(clock.next_at(1_000).as_millis(), 1_000);
        assert_eq!(clock.next_at(1_500).as_millis(), 1_500);
    }

    #[test]
    fn test_ids_unique_within_same_millisecond() {
        let mut clock = IdClock::default();
        let a = clock.next_at(42);
        let b = clock.next_at(42);
        let c = clock.next_at(41);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_history_serialization() {
        let entry = HistoryEntry {
            role: Role::Assistant,
            content: "hi".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
