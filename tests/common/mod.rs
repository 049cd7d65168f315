//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use portfolio_chat::chat::{ChatBackend, FragmentStream, HistoryEntry};
use portfolio_chat::voice::{
    AudioClip, AudioDevice, AudioFormat, CaptureStream, PlayError, PlayTrigger, PlaybackEnd,
    PlaybackResource, SAMPLE_RATE, SpeechBackend, samples_to_wav,
};
use portfolio_chat::widget::{ChatWidget, SharedViewport, Viewport};
use portfolio_chat::{Config, Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A phone-sized viewport
pub const PHONE: Viewport = Viewport::new(390.0, 844.0);

/// A desktop-sized viewport
pub const DESKTOP: Viewport = Viewport::new(1440.0, 900.0);

/// Deterministic noise, loud enough to read as speech
pub fn generate_noise(count: usize, amplitude: f32) -> Vec<f32> {
    let mut state: u32 = 0x1234_5678;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (state >> 8) as f32 / (1u32 << 24) as f32;
            amplitude * (unit * 2.0 - 1.0)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Scripted microphone and speaker
///
/// Counts every acquired stream and resource and how many are still alive, so
/// tests can check that everything gets released.
#[derive(Default)]
pub struct FakeAudioDevice {
    /// Noise amplitude the microphone "hears"; 0.0 is silence
    amplitude: Arc<Mutex<f32>>,
    deny_microphone: AtomicBool,
    /// Permission prompt nobody answers; opening never completes
    stall_microphone: AtomicBool,
    block_autoplay: AtomicBool,
    microphones_opened: AtomicUsize,
    live_microphones: Arc<AtomicUsize>,
    clips_loaded: AtomicUsize,
    live_resources: Arc<AtomicUsize>,
    halts: Arc<AtomicUsize>,
    pending_ends: Arc<Mutex<Vec<oneshot::Sender<PlaybackEnd>>>>,
}

impl FakeAudioDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        *self.amplitude.lock().unwrap() = amplitude;
    }

    pub fn deny_microphone(&self) {
        self.deny_microphone.store(true, Ordering::SeqCst);
    }

    pub fn stall_microphone(&self, stalled: bool) {
        self.stall_microphone.store(stalled, Ordering::SeqCst);
    }

    pub fn block_autoplay(&self) {
        self.block_autoplay.store(true, Ordering::SeqCst);
    }

    pub fn microphones_opened(&self) -> usize {
        self.microphones_opened.load(Ordering::SeqCst)
    }

    pub fn live_microphones(&self) -> usize {
        self.live_microphones.load(Ordering::SeqCst)
    }

    pub fn clips_loaded(&self) -> usize {
        self.clips_loaded.load(Ordering::SeqCst)
    }

    pub fn live_resources(&self) -> usize {
        self.live_resources.load(Ordering::SeqCst)
    }

    pub fn halts(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }

    /// Let the most recently started playback end naturally
    pub fn finish_playback(&self) -> bool {
        self.pending_ends
            .lock()
            .unwrap()
            .pop()
            .is_some_and(|tx| tx.send(PlaybackEnd::Completed).is_ok())
    }
}

#[async_trait]
impl AudioDevice for FakeAudioDevice {
    async fn open_microphone(&self) -> Result<Box<dyn CaptureStream>> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(Error::Microphone("permission denied".to_string()));
        }
        if self.stall_microphone.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.microphones_opened.fetch_add(1, Ordering::SeqCst);
        self.live_microphones.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            amplitude: Arc::clone(&self.amplitude),
            live: Arc::clone(&self.live_microphones),
        }))
    }

    fn load(&self, clip: AudioClip) -> Result<Box<dyn PlaybackResource>> {
        if clip.is_empty() {
            return Err(Error::Playback("empty clip".to_string()));
        }
        self.clips_loaded.fetch_add(1, Ordering::SeqCst);
        self.live_resources.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeResource {
            autoplay: !self.block_autoplay.load(Ordering::SeqCst),
            live: Arc::clone(&self.live_resources),
            halts: Arc::clone(&self.halts),
            pending_ends: Arc::clone(&self.pending_ends),
        }))
    }
}

struct FakeCapture {
    amplitude: Arc<Mutex<f32>>,
    live: Arc<AtomicUsize>,
}

impl CaptureStream for FakeCapture {
    fn recent_samples(&self, count: usize) -> Vec<f32> {
        let amplitude = *self.amplitude.lock().unwrap();
        if amplitude == 0.0 {
            vec![0.0; count]
        } else {
            generate_noise(count, amplitude)
        }
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn finish(self: Box<Self>) -> Result<AudioClip> {
        let data = samples_to_wav(&generate_noise(160, 0.2), SAMPLE_RATE)?;
        Ok(AudioClip::new(data, AudioFormat::Wav))
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeResource {
    autoplay: bool,
    live: Arc<AtomicUsize>,
    halts: Arc<AtomicUsize>,
    pending_ends: Arc<Mutex<Vec<oneshot::Sender<PlaybackEnd>>>>,
}

impl PlaybackResource for FakeResource {
    fn play(
        &self,
        trigger: PlayTrigger,
    ) -> std::result::Result<oneshot::Receiver<PlaybackEnd>, PlayError> {
        if trigger == PlayTrigger::Autoplay && !self.autoplay {
            return Err(PlayError::Blocked);
        }
        let (tx, rx) = oneshot::channel();
        self.pending_ends.lock().unwrap().push(tx);
        Ok(rx)
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeResource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// One scripted chat endpoint response
pub enum ChatScript {
    /// 2xx with these body fragments
    Fragments(Vec<String>),
    /// Non-2xx status
    Status(u16),
    /// 2xx, these fragments, then a read error
    BreakAfter(Vec<String>),
    /// 2xx, fragments pushed by the test through the returned sender
    Live(mpsc::UnboundedReceiver<Result<String>>),
}

impl ChatScript {
    pub fn fragments(parts: &[&str]) -> Self {
        Self::Fragments(parts.iter().map(ToString::to_string).collect())
    }

    /// A live stream and the sender that feeds it
    pub fn live() -> (Self, mpsc::UnboundedSender<Result<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Live(rx), tx)
    }
}

/// Chat backend answering from a queue of scripts
#[derive(Default)]
pub struct ScriptedChatBackend {
    scripts: Mutex<VecDeque<ChatScript>>,
    requests: Mutex<Vec<Vec<HistoryEntry>>>,
}

impl ScriptedChatBackend {
    pub fn new(scripts: Vec<ChatScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, script: ChatScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Histories received, oldest first
    pub fn requests(&self) -> Vec<Vec<HistoryEntry>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChatBackend {
    async fn stream_reply(&self, history: Vec<HistoryEntry>) -> Result<FragmentStream> {
        self.requests.lock().unwrap().push(history);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ChatScript::Fragments(Vec::new()));

        match script {
            ChatScript::Fragments(parts) => {
                Ok(futures::stream::iter(parts.into_iter().map(Ok)).boxed())
            }
            ChatScript::Status(code) => Err(Error::Chat(format!("chat endpoint returned {code}"))),
            ChatScript::BreakAfter(parts) => {
                let items = parts
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(Error::Chat("connection reset".to_string()))));
                Ok(futures::stream::iter(items).boxed())
            }
            ChatScript::Live(rx) => Ok(UnboundedReceiverStream::new(rx).boxed()),
        }
    }
}

/// Speech backend with a fixed transcript and canned audio
pub struct FakeSpeechBackend {
    transcript: Mutex<Option<String>>,
    fail_synthesis: AtomicBool,
    transcribed: Mutex<Vec<AudioClip>>,
    synthesized: Mutex<Vec<String>>,
}

impl FakeSpeechBackend {
    /// Transcribes every clip to `transcript`
    pub fn new(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: Mutex::new(Some(transcript.to_string())),
            fail_synthesis: AtomicBool::new(false),
            transcribed: Mutex::new(Vec::new()),
            synthesized: Mutex::new(Vec::new()),
        })
    }

    /// Make transcription fail
    pub fn fail_transcription(&self) {
        *self.transcript.lock().unwrap() = None;
    }

    pub fn fail_synthesis(&self) {
        self.fail_synthesis.store(true, Ordering::SeqCst);
    }

    pub fn transcribed(&self) -> Vec<AudioClip> {
        self.transcribed.lock().unwrap().clone()
    }

    pub fn synthesized(&self) -> Vec<String> {
        self.synthesized.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechBackend for FakeSpeechBackend {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        self.transcribed.lock().unwrap().push(clip.clone());
        self.transcript
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Transcription("transcription endpoint returned 500".to_string()))
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        self.synthesized.lock().unwrap().push(text.to_string());
        if self.fail_synthesis.load(Ordering::SeqCst) {
            return Err(Error::Synthesis("speech endpoint returned 500".to_string()));
        }
        Ok(AudioClip::new(vec![0xFF, 0xF3, 0x44, 0xC4], AudioFormat::Mp3))
    }
}

// ---------------------------------------------------------------------------
// Widget
// ---------------------------------------------------------------------------

/// A widget wired to fakes, plus handles to inspect them
pub struct Harness {
    pub widget: ChatWidget,
    pub chat: Arc<ScriptedChatBackend>,
    pub speech: Arc<FakeSpeechBackend>,
    pub audio: Arc<FakeAudioDevice>,
    pub viewport: Arc<SharedViewport>,
}

impl Harness {
    pub fn new(scripts: Vec<ChatScript>) -> Self {
        Self::with_config(Config::default(), scripts)
    }

    pub fn with_config(config: Config, scripts: Vec<ChatScript>) -> Self {
        Self::assemble(config, scripts, "What projects has Fran built?")
    }

    /// Widget whose recordings all transcribe to `transcript`
    pub fn with_transcript(transcript: &str, scripts: Vec<ChatScript>) -> Self {
        Self::assemble(Config::default(), scripts, transcript)
    }

    fn assemble(config: Config, scripts: Vec<ChatScript>, transcript: &str) -> Self {
        let chat = ScriptedChatBackend::new(scripts);
        let speech = FakeSpeechBackend::new(transcript);
        let audio = FakeAudioDevice::new();
        let viewport = Arc::new(SharedViewport::new(DESKTOP));

        let widget = ChatWidget::new(
            config,
            Arc::clone(&chat) as Arc<dyn ChatBackend>,
            Arc::clone(&speech) as Arc<dyn SpeechBackend>,
            Arc::clone(&audio) as Arc<dyn AudioDevice>,
            Arc::clone(&viewport) as Arc<dyn portfolio_chat::widget::ViewportObserver>,
        );

        Self {
            widget,
            chat,
            speech,
            audio,
            viewport,
        }
    }
}
