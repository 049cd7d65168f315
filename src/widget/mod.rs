//! The chat widget
//!
//! [`ChatWidget`] owns the conversation, the expand/collapse shell and the
//! voice subsystem, and talks to the backends through injected handles.
//! Every state change is broadcast as a [`WidgetEvent`]; [`ChatWidget::view`]
//! returns a full snapshot for rendering.

mod shell;
mod typewriter;
mod view;
mod viewport;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::chat::{
    CHAT_ERROR_MESSAGE, ChatBackend, ChatMessage, ChatSession, MessageId, SubmitRejected,
    consume_fragments,
};
use crate::config::Config;
use crate::voice::{
    AudioDevice, AudioPlayer, AudioRecorder, PlaybackPhase, SpeechBackend, VoiceNotifier,
};
use crate::{Error, Result};

pub use shell::{ExpandTrigger, Shell, ShellLayout, UiMode};
pub use typewriter::{DELETE_DELAY, PHRASE_PAUSE, TYPE_DELAY, Typewriter};
pub use view::{VoiceIndicator, WidgetEvent, WidgetView};
pub use viewport::{SharedViewport, Viewport, ViewportObserver};

/// Alert raised when the microphone cannot be opened
pub const MICROPHONE_ALERT: &str = "Could not access microphone. Please check permissions.";

/// Alert raised when a recording could not be transcribed
pub const TRANSCRIPTION_ALERT: &str = "Failed to transcribe audio. Please try again.";

/// Capacity of the event channel; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 1024;

/// How a submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Ignored; nothing changed
    Rejected(SubmitRejected),
    /// Reply fully streamed
    Completed { reply: MessageId, content: String },
    /// Request or stream failed; the error banner is set
    Failed { error: String },
}

impl SubmitOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// How a voice turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceTurn {
    /// A recording or transcription is already running
    Busy,
    /// Microphone could not be opened
    MicrophoneUnavailable,
    /// Recording could not be finalized or transcribed
    TranscriptionFailed,
    /// Transcript was blank; nothing submitted
    NothingHeard,
    /// Transcript was submitted as a voice question
    Submitted { transcript: String, outcome: SubmitOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Typed,
    Voice,
}

struct WidgetState {
    session: ChatSession,
    shell: Shell,
    typewriter: Typewriter,
}

struct WidgetInner {
    config: Config,
    state: Mutex<WidgetState>,
    chat: Arc<dyn ChatBackend>,
    speech: Arc<dyn SpeechBackend>,
    recorder: AudioRecorder,
    player: AudioPlayer,
    viewport: Arc<dyn ViewportObserver>,
    events: broadcast::Sender<WidgetEvent>,
}

/// Conversational widget handle; clones share the same widget
#[derive(Clone)]
pub struct ChatWidget {
    inner: Arc<WidgetInner>,
}

impl std::fmt::Debug for ChatWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWidget")
            .field("mode", &self.state().shell.mode())
            .finish_non_exhaustive()
    }
}

/// Fails the request if its submission is dropped before it settles
struct InFlightGuard<'a> {
    widget: &'a ChatWidget,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let abandoned = {
            let mut st = self.widget.state();
            if st.session.is_loading() {
                st.session.fail(CHAT_ERROR_MESSAGE);
                true
            } else {
                false
            }
        };
        if abandoned {
            tracing::warn!("chat request abandoned before the reply finished");
            self.widget
                .emit(WidgetEvent::ErrorChanged(Some(CHAT_ERROR_MESSAGE.to_string())));
            self.widget.emit(WidgetEvent::LoadingChanged(false));
        }
    }
}

impl ChatWidget {
    #[must_use]
    pub fn new(
        config: Config,
        chat: Arc<dyn ChatBackend>,
        speech: Arc<dyn SpeechBackend>,
        audio: Arc<dyn AudioDevice>,
        viewport: Arc<dyn ViewportObserver>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let voice_events = events.clone();
        let notify: VoiceNotifier = Arc::new(move |event| {
            let _ = voice_events.send(WidgetEvent::Voice(event));
        });

        let recorder = AudioRecorder::new(
            Arc::clone(&audio),
            config.voice.silence.clone(),
            Arc::clone(&notify),
        );
        let player = AudioPlayer::new(audio, notify);

        let state = WidgetState {
            session: ChatSession::new(),
            shell: Shell::new(&config.widget),
            typewriter: Typewriter::new(config.widget.teaser_phrases.clone()),
        };

        Self {
            inner: Arc::new(WidgetInner {
                config,
                state: Mutex::new(state),
                chat,
                speech,
                recorder,
                player,
                viewport,
                events,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Receive every subsequent [`WidgetEvent`]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of everything needed to render
    #[must_use]
    pub fn view(&self) -> WidgetView {
        let viewport = self.inner.viewport.current();
        let recording = self.inner.recorder.status();
        let playback = self.inner.player.phase();
        let st = self.state();

        let placeholder = if st.shell.is_expanded() {
            self.inner.config.widget.expanded_placeholder.clone()
        } else {
            st.typewriter.text().to_string()
        };

        WidgetView {
            mode: st.shell.mode(),
            layout: st.shell.layout(&viewport),
            messages: st.session.messages().to_vec(),
            input: st.session.input().to_string(),
            placeholder,
            is_loading: st.session.is_loading(),
            error: st.session.error().map(ToString::to_string),
            show_typing_indicator: st.session.awaiting_first_fragment(),
            can_submit: st.session.can_submit(st.session.input()),
            can_close: st.shell.can_close(&viewport),
            recording,
            playback,
            voice_indicator: VoiceIndicator::from_status(recording, playback),
        }
    }

    /// Replace the input buffer
    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state().session.set_input(text.clone());
        self.emit(WidgetEvent::InputChanged(text));
    }

    pub fn focus_input(&self) {
        self.expand(ExpandTrigger::InputFocused);
    }

    pub fn click_input(&self) {
        self.expand(ExpandTrigger::InputClicked);
    }

    /// Explicit close action; only honoured on narrow viewports
    pub fn close(&self) -> bool {
        let viewport = self.inner.viewport.current();
        let closed = self.state().shell.close(&viewport);
        if closed {
            self.emit(WidgetEvent::ModeChanged(UiMode::Collapsed));
        }
        closed
    }

    /// Advance the collapsed placeholder animation by one step
    ///
    /// Returns the delay before the next step.
    pub fn tick_placeholder(&self) -> Duration {
        let (delay, text) = {
            let mut st = self.state();
            let delay = st.typewriter.tick();
            let text = (!st.shell.is_expanded()).then(|| st.typewriter.text().to_string());
            (delay, text)
        };
        if let Some(text) = text {
            self.emit(WidgetEvent::PlaceholderChanged(text));
        }
        delay
    }

    /// Drive the placeholder animation until the task is dropped
    pub async fn animate_placeholder(&self) {
        loop {
            let delay = self.tick_placeholder();
            tokio::time::sleep(delay).await;
        }
    }

    /// Re-announce the layout whenever the viewport changes while it is tracked
    ///
    /// Runs until the viewport source goes away.
    pub async fn follow_viewport(&self) {
        let mut rx = self.inner.viewport.watch();
        while rx.changed().await.is_ok() {
            let viewport = *rx.borrow_and_update();
            let layout = {
                let st = self.state();
                st.shell
                    .tracks_viewport(&viewport)
                    .then(|| st.shell.layout(&viewport))
            };
            if let Some(layout) = layout {
                tracing::trace!(height = viewport.height, top = viewport.offset_top, "viewport changed");
                self.emit(WidgetEvent::LayoutChanged(layout));
            }
        }
    }

    /// Submit the current input buffer
    pub async fn submit_input(&self) -> SubmitOutcome {
        let text = self.state().session.input().to_string();
        self.submit(&text).await
    }

    /// Submit a typed question and stream the reply into the log
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        self.run_submit(text, Origin::Typed).await
    }

    async fn run_submit(&self, text: &str, origin: Origin) -> SubmitOutcome {
        let (history, user_message, expanded) = {
            let mut st = self.state();
            let history = match st.session.begin_submit(text) {
                Ok(history) => history,
                Err(rejected) => {
                    tracing::debug!(?rejected, "submission ignored");
                    return SubmitOutcome::Rejected(rejected);
                }
            };
            let user_message = st.session.last_message().cloned();
            let expanded = st.shell.expand(ExpandTrigger::MessageAppended);
            (history, user_message, expanded)
        };
        let _in_flight = InFlightGuard { widget: self };

        if let Some(message) = user_message {
            self.emit(WidgetEvent::MessageAppended(message));
        }
        self.emit(WidgetEvent::InputChanged(String::new()));
        self.emit(WidgetEvent::ErrorChanged(None));
        self.emit(WidgetEvent::LoadingChanged(true));
        if expanded {
            self.emit(WidgetEvent::ModeChanged(UiMode::Expanded));
        }

        tracing::info!(messages = history.len(), ?origin, "submitting question");

        let stream = match self.inner.chat.stream_reply(history).await {
            Ok(stream) => stream,
            Err(e) => return self.fail_submit(&e),
        };

        let reply = {
            let mut st = self.state();
            st.session
                .open_reply()
                .and_then(|id| st.session.last_message().cloned().map(|m| (id, m)))
        };
        let Some((reply, placeholder)) = reply else {
            return self.fail_submit(&Error::Chat("reply opened outside a request".to_string()));
        };
        self.emit(WidgetEvent::MessageAppended(placeholder));

        let consumed = consume_fragments(stream, |fragment| {
            let content = self
                .state()
                .session
                .append_fragment(fragment)
                .map(|m| m.content.clone());
            if let Some(content) = content {
                self.emit(WidgetEvent::MessageUpdated { id: reply, content });
            }
        })
        .await;

        if let Err(e) = consumed {
            return self.fail_submit(&e);
        }

        let content = {
            let mut st = self.state();
            st.session.complete();
            st.session.reply_content(reply).unwrap_or_default().to_string()
        };
        self.emit(WidgetEvent::LoadingChanged(false));
        tracing::info!(chars = content.chars().count(), "reply complete");

        if origin == Origin::Voice && self.inner.config.voice.auto_speak {
            self.speak(&content).await;
        }

        SubmitOutcome::Completed { reply, content }
    }

    fn fail_submit(&self, error: &Error) -> SubmitOutcome {
        tracing::error!(error = %error, "chat request failed");
        self.state().session.fail(CHAT_ERROR_MESSAGE);
        self.emit(WidgetEvent::ErrorChanged(Some(CHAT_ERROR_MESSAGE.to_string())));
        self.emit(WidgetEvent::LoadingChanged(false));
        SubmitOutcome::Failed {
            error: CHAT_ERROR_MESSAGE.to_string(),
        }
    }

    /// Record a spoken question, transcribe it and submit it
    ///
    /// The recording ends on [`ChatWidget::stop_recording`] or after
    /// sustained silence. The reply is spoken when `voice.auto_speak` is on.
    pub async fn voice_turn(&self) -> VoiceTurn {
        self.expand(ExpandTrigger::VoiceCapture);

        let handle = match self.inner.recorder.start().await {
            Ok(handle) => handle,
            Err(Error::RecordingInProgress) => {
                tracing::debug!("voice turn ignored, recorder busy");
                return VoiceTurn::Busy;
            }
            Err(e) => {
                tracing::warn!(error = %e, "microphone unavailable");
                self.emit(WidgetEvent::Alert(MICROPHONE_ALERT.to_string()));
                return VoiceTurn::MicrophoneUnavailable;
            }
        };

        let transcript = match self.transcribe(handle).await {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::error!(error = %e, "transcription failed");
                self.emit(WidgetEvent::Alert(TRANSCRIPTION_ALERT.to_string()));
                return VoiceTurn::TranscriptionFailed;
            }
        };

        if transcript.trim().is_empty() {
            tracing::debug!("empty transcript, nothing to submit");
            return VoiceTurn::NothingHeard;
        }

        self.set_input(transcript.clone());
        let outcome = self.run_submit(&transcript, Origin::Voice).await;

        VoiceTurn::Submitted { transcript, outcome }
    }

    /// Wait for the recording to end and transcribe it
    ///
    /// The recorder reports processing until this returns.
    async fn transcribe(&self, handle: crate::voice::CaptureHandle) -> Result<String> {
        let recording = handle.finished().await?;
        tracing::debug!(
            reason = ?recording.reason,
            bytes = recording.clip.data.len(),
            "transcribing recording"
        );
        self.inner.speech.transcribe(&recording.clip).await
    }

    /// Stop the current recording; it is then transcribed and submitted
    pub fn stop_recording(&self) -> bool {
        self.inner.recorder.stop()
    }

    /// Synthesize `text` and play it, superseding anything already loaded
    ///
    /// Returns the resulting playback phase, or `None` when nothing was
    /// loaded (blank text, refused while recording, or synthesis failed).
    pub async fn speak(&self, text: &str) -> Option<PlaybackPhase> {
        if text.trim().is_empty() {
            return None;
        }
        if self.inner.recorder.is_recording() && !self.inner.config.voice.speak_while_recording {
            tracing::debug!("not speaking while recording");
            return None;
        }

        let clip = match self.inner.speech.synthesize(text).await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                return None;
            }
        };

        match self.inner.player.present(clip) {
            Ok(phase) => Some(phase),
            Err(e) => {
                tracing::warn!(error = %e, "synthesized audio could not be loaded");
                None
            }
        }
    }

    /// Play a reply whose autoplay was blocked
    pub fn play_pending_audio(&self) -> bool {
        self.inner.player.play_pending()
    }

    /// Halt and release any playing or pending audio
    pub fn stop_audio(&self) -> bool {
        self.inner.player.stop()
    }

    fn expand(&self, trigger: ExpandTrigger) {
        let expanded = self.state().shell.expand(trigger);
        if expanded {
            self.emit(WidgetEvent::ModeChanged(UiMode::Expanded));
        }
    }

    fn emit(&self, event: WidgetEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn state(&self) -> MutexGuard<'_, WidgetState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the message log
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state().session.messages().to_vec()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().session.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state().session.error().map(ToString::to_string)
    }
}
