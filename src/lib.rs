//! Portfolio Chat - conversational chat and voice widget core
//!
//! This library provides the interaction core of a portfolio site's chat
//! widget:
//! - Chat session state and streaming reply consumption
//! - The expand/collapse widget shell with viewport tracking
//! - Voice recording with silence auto-stop, transcription and spoken replies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Front-end (CLI)                     │
//! │        render WidgetView  │  react to WidgetEvent    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   ChatWidget                         │
//! │   ChatSession  │  Shell  │  Recorder  │  Player      │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │                             │
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │  ApiClient (HTTP)   │       │  NativeAudio (cpal)   │
//! │ chat │ transcribe │ │       │  microphone │ speaker │
//! │ speak               │       └───────────────────────┘
//! └─────────────────────┘
//! ```

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod voice;
pub mod widget;

pub use chat::{ChatBackend, ChatMessage, ChatSession, MessageId, Role};
pub use client::ApiClient;
pub use config::Config;
pub use error::{Error, Result};
pub use voice::{AudioDevice, NativeAudio, SpeechBackend};
pub use widget::{
    ChatWidget, SharedViewport, SubmitOutcome, Viewport, ViewportObserver, VoiceTurn,
    WidgetEvent, WidgetView,
};
