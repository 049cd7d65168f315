//! [`AudioDevice`] backed by the host's default microphone and speaker

use async_trait::async_trait;

use super::capture::MicrophoneCapture;
use super::device::{AudioClip, AudioDevice, CaptureStream, PlaybackResource};
use super::playback::SpeakerClip;
use crate::Result;

/// Real audio hardware via cpal
#[derive(Debug, Clone, Copy)]
pub struct NativeAudio {
    sample_rate: u32,
    autoplay: bool,
}

impl NativeAudio {
    /// `sample_rate` is the preferred capture rate; with `autoplay` off,
    /// synthesized speech waits for an explicit play command
    #[must_use]
    pub const fn new(sample_rate: u32, autoplay: bool) -> Self {
        Self {
            sample_rate,
            autoplay,
        }
    }
}

#[async_trait]
impl AudioDevice for NativeAudio {
    async fn open_microphone(&self) -> Result<Box<dyn CaptureStream>> {
        let capture = MicrophoneCapture::open(self.sample_rate).await?;
        Ok(Box::new(capture))
    }

    fn load(&self, clip: AudioClip) -> Result<Box<dyn PlaybackResource>> {
        let resource = SpeakerClip::load(&clip, self.autoplay)?;
        Ok(Box::new(resource))
    }
}
