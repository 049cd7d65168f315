//! Speech service seam

use async_trait::async_trait;

use super::device::AudioClip;
use crate::Result;

/// Transcription and synthesis endpoints
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Turn recorded audio into text
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the service reports an error
    async fn transcribe(&self, clip: &AudioClip) -> Result<String>;

    /// Turn text into playable audio
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the service reports an error
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}
