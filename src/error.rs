//! Error types for the portfolio chat widget

use thiserror::Error;

/// Result type alias for widget operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the chat widget
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone could not be acquired (permission denied, no device)
    #[error("microphone unavailable: {0}")]
    Microphone(String),

    /// A recording is already in progress
    #[error("a recording is already in progress")]
    RecordingInProgress,

    /// Chat endpoint failed (non-2xx status or broken stream)
    #[error("chat request failed: {0}")]
    Chat(String),

    /// Transcription endpoint failed
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Speech synthesis endpoint failed
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
