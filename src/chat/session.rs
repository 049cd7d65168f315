//! Conversation state for a single widget session
//!
//! Holds the ordered message log, the input buffer and the request phase.
//! The log is append-only; only the trailing assistant message is mutated
//! while its reply streams in.

use super::message::{ChatMessage, HistoryEntry, IdClock, MessageId, Role};

/// Banner text shown when a chat request fails
pub const CHAT_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Request lifecycle of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No request in flight
    Idle,
    /// Request sent, waiting for the response to start
    Submitting,
    /// Reply is streaming into the given assistant message
    Streaming { reply: MessageId },
    /// Last request failed; a new submission is allowed
    Failed,
}

impl SessionPhase {
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Submitting | Self::Streaming { .. })
    }
}

/// Why a submission was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejected {
    /// Input is empty or whitespace only
    EmptyInput,
    /// Another request is still in flight
    RequestInFlight,
}

/// Message log, input buffer and request phase
#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    input: String,
    phase: SessionPhase,
    error: Option<String>,
    clock: IdClock,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            input: String::new(),
            phase: SessionPhase::Idle,
            error: None,
            clock: IdClock::default(),
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.phase.is_in_flight()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a submission of `text` would be accepted right now
    #[must_use]
    pub fn can_submit(&self, text: &str) -> bool {
        self.check_submit(text).is_ok()
    }

    /// Request sent but no reply bytes yet
    #[must_use]
    pub const fn awaiting_first_fragment(&self) -> bool {
        matches!(self.phase, SessionPhase::Submitting)
    }

    fn check_submit(&self, text: &str) -> Result<(), SubmitRejected> {
        if text.trim().is_empty() {
            return Err(SubmitRejected::EmptyInput);
        }
        if self.phase.is_in_flight() {
            return Err(SubmitRejected::RequestInFlight);
        }
        Ok(())
    }

    /// Append the user's message and enter the submitting phase
    ///
    /// Returns the full history to send, including the new message.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitRejected`] for blank input or while a request is in flight;
    /// the session is left untouched in that case.
    pub fn begin_submit(&mut self, text: &str) -> Result<Vec<HistoryEntry>, SubmitRejected> {
        self.check_submit(text)?;

        let id = self.clock.next_id();
        self.messages
            .push(ChatMessage::new(id, Role::User, text.to_string()));
        self.input.clear();
        self.error = None;
        self.phase = SessionPhase::Submitting;

        Ok(self.messages.iter().map(ChatMessage::to_history).collect())
    }

    /// Append the empty assistant message that the reply streams into
    ///
    /// Returns `None` unless the session is waiting for a response.
    pub fn open_reply(&mut self) -> Option<MessageId> {
        if self.phase != SessionPhase::Submitting {
            return None;
        }

        let id = self.clock.next_id();
        self.messages
            .push(ChatMessage::new(id, Role::Assistant, String::new()));
        self.phase = SessionPhase::Streaming { reply: id };
        Some(id)
    }

    /// Append a fragment to the streaming reply
    ///
    /// Returns the updated message, or `None` when nothing is streaming.
    pub fn append_fragment(&mut self, fragment: &str) -> Option<&ChatMessage> {
        let SessionPhase::Streaming { reply } = self.phase else {
            return None;
        };

        let message = self.messages.last_mut().filter(|m| m.id == reply)?;
        message.content.push_str(fragment);
        Some(message)
    }

    /// Mark the in-flight request as finished
    pub fn complete(&mut self) {
        if self.phase.is_in_flight() {
            self.phase = SessionPhase::Idle;
        }
    }

    /// Mark the in-flight request as failed
    ///
    /// Partial reply content stays in the log as-is.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.phase = SessionPhase::Failed;
    }

    /// Content of the reply currently or most recently streamed
    #[must_use]
    pub fn reply_content(&self, id: MessageId) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.id == id)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_input_rejected() {
        let mut session = ChatSession::new();
        assert_eq!(
            session.begin_submit("   \n\t"),
            Err(SubmitRejected::EmptyInput)
        );
        assert!(session.messages().is_empty());
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_submit_appends_and_clears_input() {
        let mut session = ChatSession::new();
        session.set_input("hello");
        let history = session.begin_submit("hello").unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(session.input(), "");
        assert!(session.is_loading());
        assert!(session.awaiting_first_fragment());
    }

    #[test]
    fn test_in_flight_rejected() {
        let mut session = ChatSession::new();
        session.begin_submit("one").unwrap();
        assert_eq!(
            session.begin_submit("two"),
            Err(SubmitRejected::RequestInFlight)
        );
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_fragments_grow_single_reply() {
        let mut session = ChatSession::new();
        session.begin_submit("hi").unwrap();
        let reply = session.open_reply().unwrap();

        assert_eq!(session.append_fragment("Hel").unwrap().content, "Hel");
        assert_eq!(session.append_fragment("lo").unwrap().content, "Hello");
        session.complete();

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.reply_content(reply), Some("Hello"));
        assert!(!session.is_loading());
    }

    #[test]
    fn test_fragment_ignored_when_not_streaming() {
        let mut session = ChatSession::new();
        assert!(session.append_fragment("stray").is_none());
        assert!(session.open_reply().is_none());
    }

    #[test]
    fn test_failure_keeps_partial_reply() {
        let mut session = ChatSession::new();
        session.begin_submit("hi").unwrap();
        session.open_reply().unwrap();
        session.append_fragment("partial");
        session.fail(CHAT_ERROR_MESSAGE);

        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.error(), Some(CHAT_ERROR_MESSAGE));
        assert_eq!(session.last_message().unwrap().content, "partial");

        // New submission clears the banner
        session.begin_submit("again").unwrap();
        assert_eq!(session.error(), None);
    }

    #[test]
    fn test_history_includes_previous_turns() {
        let mut session = ChatSession::new();
        session.begin_submit("first").unwrap();
        session.open_reply().unwrap();
        session.append_fragment("answer");
        session.complete();

        let history = session.begin_submit("second").unwrap();
        let roles: Vec<Role> = history.iter().map(|h| h.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(history[1].content, "answer");
    }
}
