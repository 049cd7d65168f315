//! Audio hardware capability handles
//!
//! The widget never touches a microphone or speaker directly. It is handed an
//! [`AudioDevice`] which opens capture streams and loads playable resources,
//! so tests can substitute a scripted device.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::Result;

/// Encoding of an audio payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
        }
    }

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Wav => "audio.wav",
            Self::Mp3 => "audio.mp3",
        }
    }

    /// Guess the format from a `Content-Type` header value
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence {
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(Self::Wav),
            "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
            _ => None,
        }
    }
}

/// A finished, encoded audio payload (recorded or synthesized)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl AudioClip {
    #[must_use]
    pub const fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Microphone and speaker access
#[async_trait]
pub trait AudioDevice: Send + Sync {
    /// Acquire the microphone and start buffering audio
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Microphone`] when permission is denied or no
    /// input device exists
    async fn open_microphone(&self) -> Result<Box<dyn CaptureStream>>;

    /// Prepare a clip for playback
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be decoded
    fn load(&self, clip: AudioClip) -> Result<Box<dyn PlaybackResource>>;
}

/// A live microphone capture
///
/// Dropping a capture without calling [`CaptureStream::finish`] must still
/// release the microphone.
pub trait CaptureStream: Send {
    /// The most recent `count` mono samples (fewer if not enough were captured)
    fn recent_samples(&self, count: usize) -> Vec<f32>;

    /// Sample rate of the captured audio
    fn sample_rate(&self) -> u32;

    /// Stop capturing, release the microphone and encode everything captured
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails; the microphone is released regardless
    fn finish(self: Box<Self>) -> Result<AudioClip>;
}

/// What started a playback attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayTrigger {
    /// Unsolicited playback right after synthesis
    Autoplay,
    /// Explicit user action
    UserGesture,
}

/// How a started playback ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    Completed,
    Failed(String),
}

/// Why playback did not start
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    /// The runtime refuses unsolicited playback
    #[error("autoplay blocked")]
    Blocked,
    #[error("playback failed: {0}")]
    Failed(String),
}

/// A loaded, playable audio resource
///
/// Dropping the resource releases it.
pub trait PlaybackResource: Send + Sync {
    /// Start playing; the receiver resolves when playback ends on its own
    ///
    /// # Errors
    ///
    /// Returns [`PlayError::Blocked`] when autoplay is refused
    fn play(&self, trigger: PlayTrigger) -> std::result::Result<oneshot::Receiver<PlaybackEnd>, PlayError>;

    /// Halt playback immediately
    fn halt(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_mime() {
        assert_eq!(AudioFormat::from_mime("audio/mpeg"), Some(AudioFormat::Mp3));
        assert_eq!(
            AudioFormat::from_mime("audio/wav; codecs=1"),
            Some(AudioFormat::Wav)
        );
        assert_eq!(AudioFormat::from_mime("application/json"), None);
    }
}
