//! Render snapshot and change events

use super::shell::{ShellLayout, UiMode};
use crate::chat::{ChatMessage, MessageId};
use crate::voice::{PlaybackPhase, RecordingPhase, RecordingStatus, VoiceEvent};

/// Which voice indicator to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceIndicator {
    Off,
    /// Recording, with whole seconds elapsed
    Listening { seconds: u64 },
    Transcribing,
    Speaking,
    /// A spoken reply is waiting for the play button
    ReplyReady,
}

impl VoiceIndicator {
    /// Recording state wins over playback state
    #[must_use]
    pub const fn from_status(recording: RecordingStatus, playback: PlaybackPhase) -> Self {
        match recording.phase {
            RecordingPhase::Starting => Self::Listening { seconds: 0 },
            RecordingPhase::Recording => Self::Listening {
                seconds: recording.duration_secs,
            },
            RecordingPhase::Processing => Self::Transcribing,
            RecordingPhase::Idle => match playback {
                PlaybackPhase::Playing => Self::Speaking,
                PlaybackPhase::Pending => Self::ReplyReady,
                PlaybackPhase::Idle => Self::Off,
            },
        }
    }
}

/// Everything a front-end needs to draw the widget
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetView {
    pub mode: UiMode,
    pub layout: ShellLayout,
    pub messages: Vec<ChatMessage>,
    pub input: String,
    pub placeholder: String,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Request sent, no reply text yet
    pub show_typing_indicator: bool,
    pub can_submit: bool,
    /// Close button offered (expanded on a narrow viewport)
    pub can_close: bool,
    pub recording: RecordingStatus,
    pub playback: PlaybackPhase,
    pub voice_indicator: VoiceIndicator,
}

/// Change notifications, broadcast to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    MessageAppended(ChatMessage),
    /// The streaming reply grew
    MessageUpdated { id: MessageId, content: String },
    LoadingChanged(bool),
    ErrorChanged(Option<String>),
    ModeChanged(UiMode),
    InputChanged(String),
    PlaceholderChanged(String),
    LayoutChanged(ShellLayout),
    /// Blocking notice for the user (microphone or transcription failure)
    Alert(String),
    Voice(VoiceEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(phase: RecordingPhase, duration_secs: u64) -> RecordingStatus {
        RecordingStatus {
            phase,
            duration_secs,
        }
    }

    #[test]
    fn test_indicator_prefers_recording() {
        assert_eq!(
            VoiceIndicator::from_status(status(RecordingPhase::Recording, 3), PlaybackPhase::Playing),
            VoiceIndicator::Listening { seconds: 3 }
        );
        assert_eq!(
            VoiceIndicator::from_status(status(RecordingPhase::Processing, 0), PlaybackPhase::Idle),
            VoiceIndicator::Transcribing
        );
    }

    #[test]
    fn test_indicator_playback_states() {
        let idle = status(RecordingPhase::Idle, 0);
        assert_eq!(
            VoiceIndicator::from_status(idle, PlaybackPhase::Pending),
            VoiceIndicator::ReplyReady
        );
        assert_eq!(
            VoiceIndicator::from_status(idle, PlaybackPhase::Idle),
            VoiceIndicator::Off
        );
    }
}
