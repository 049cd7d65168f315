//! Voice input and output
//!
//! Recording with silence auto-stop, playback of synthesized replies, and
//! the hardware and service seams they run against.

mod analyser;
mod capture;
mod device;
mod native;
mod playback;
mod player;
mod recorder;
mod silence;
mod transport;

use std::sync::Arc;

pub use analyser::FrequencyAnalyser;
pub use capture::{MicrophoneCapture, SAMPLE_RATE, samples_to_wav};
pub use device::{
    AudioClip, AudioDevice, AudioFormat, CaptureStream, PlayError, PlayTrigger, PlaybackEnd,
    PlaybackResource,
};
pub use native::NativeAudio;
pub use playback::{DecodedAudio, SpeakerClip, decode};
pub use player::{AudioPlayer, PlaybackPhase};
pub use recorder::{
    AudioRecorder, CaptureHandle, FinishedRecording, RecordingPhase, RecordingStatus, StopReason,
};
pub use silence::{DEFAULT_SILENCE_THRESHOLD, SilenceDetector, SilenceSettings};
pub use transport::SpeechBackend;

/// State changes reported by the recorder and player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEvent {
    RecordingStarted,
    /// Whole seconds elapsed in the current recording
    RecordingTick { seconds: u64 },
    RecordingStopped { reason: StopReason },
    ProcessingStarted,
    ProcessingFinished,
    PlaybackStarted,
    /// Autoplay was refused; the clip waits for a user gesture
    PlaybackPending,
    PlaybackEnded,
}

/// Callback receiving [`VoiceEvent`]s
pub type VoiceNotifier = Arc<dyn Fn(VoiceEvent) + Send + Sync>;

/// A notifier that discards every event
#[must_use]
pub fn silent_notifier() -> VoiceNotifier {
    Arc::new(|_| {})
}
