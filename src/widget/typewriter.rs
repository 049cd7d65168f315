//! Typewriter animation for the collapsed prompt bar placeholder

use std::time::Duration;

/// Delay after typing a character
pub const TYPE_DELAY: Duration = Duration::from_millis(100);

/// Delay after deleting a character
pub const DELETE_DELAY: Duration = Duration::from_millis(50);

/// Pause on a fully typed phrase before deleting it
pub const PHRASE_PAUSE: Duration = Duration::from_millis(1500);

/// Types each phrase out, pauses, deletes it, then moves to the next
#[derive(Debug, Clone)]
pub struct Typewriter {
    phrases: Vec<String>,
    index: usize,
    shown: usize,
    deleting: bool,
}

impl Typewriter {
    #[must_use]
    pub fn new(phrases: Vec<String>) -> Self {
        Self {
            phrases,
            index: 0,
            shown: 0,
            deleting: false,
        }
    }

    /// Text currently displayed
    #[must_use]
    pub fn text(&self) -> &str {
        let phrase = self.phrase();
        let end = phrase
            .char_indices()
            .nth(self.shown)
            .map_or(phrase.len(), |(i, _)| i);
        &phrase[..end]
    }

    /// Advance one step; returns how long to wait before the next one
    pub fn tick(&mut self) -> Duration {
        let len = self.phrase().chars().count();
        if len == 0 {
            self.advance_phrase();
            return TYPE_DELAY;
        }

        if self.deleting {
            self.shown = self.shown.saturating_sub(1);
            if self.shown == 0 {
                self.deleting = false;
                self.advance_phrase();
                return TYPE_DELAY;
            }
            DELETE_DELAY
        } else {
            self.shown = (self.shown + 1).min(len);
            if self.shown == len {
                self.deleting = true;
                return PHRASE_PAUSE;
            }
            TYPE_DELAY
        }
    }

    fn phrase(&self) -> &str {
        self.phrases.get(self.index).map_or("", String::as_str)
    }

    fn advance_phrase(&mut self) {
        if !self.phrases.is_empty() {
            self.index = (self.index + 1) % self.phrases.len();
        }
    }
}
