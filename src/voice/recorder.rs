//! Microphone recording with silence auto-stop
//!
//! A recording runs through `Idle → Recording → Processing → Idle`. While
//! recording, two timer tasks run: a once-per-second duration counter and,
//! after the grace period, the silence monitor. Both end when the recording
//! is finalized, whether by [`AudioRecorder::stop`] or by sustained silence.
//! Finalizing always releases the microphone and the analyser.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::analyser::FrequencyAnalyser;
use super::device::{AudioClip, AudioDevice, CaptureStream};
use super::silence::{SilenceDetector, SilenceSettings};
use super::{VoiceEvent, VoiceNotifier};
use crate::{Error, Result};

/// Phase of the capture → transcribe pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingPhase {
    Idle,
    /// Microphone is being acquired
    Starting,
    Recording,
    /// Clip finalized, transcription pending
    Processing,
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Manual,
    Silence,
}

/// Snapshot of the recorder for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingStatus {
    pub phase: RecordingPhase,
    pub duration_secs: u64,
}

impl RecordingStatus {
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        matches!(self.phase, RecordingPhase::Recording)
    }

    #[must_use]
    pub const fn is_processing(&self) -> bool {
        matches!(self.phase, RecordingPhase::Processing)
    }
}

/// A finalized recording, ready for transcription
///
/// The recorder stays in [`RecordingPhase::Processing`] until this value is
/// dropped.
#[derive(Debug)]
pub struct FinishedRecording {
    pub clip: AudioClip,
    pub reason: StopReason,
    _processing: ProcessingGuard,
}

/// Pending result of a started recording
pub struct CaptureHandle {
    done: oneshot::Receiver<Result<(AudioClip, StopReason)>>,
    inner: Arc<Mutex<RecorderInner>>,
    notify: VoiceNotifier,
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle").finish_non_exhaustive()
    }
}

impl CaptureHandle {
    /// Wait until the recording is stopped (manually or by silence)
    ///
    /// # Errors
    ///
    /// Returns error if the captured audio could not be finalized
    pub async fn finished(self) -> Result<FinishedRecording> {
        let guard = ProcessingGuard {
            inner: Arc::clone(&self.inner),
            notify: Arc::clone(&self.notify),
        };
        let (clip, reason) = self
            .done
            .await
            .map_err(|_| Error::Audio("recording was abandoned".to_string()))??;

        Ok(FinishedRecording {
            clip,
            reason,
            _processing: guard,
        })
    }
}

/// Returns the recorder to idle once transcription is over, on every path
struct ProcessingGuard {
    inner: Arc<Mutex<RecorderInner>>,
    notify: VoiceNotifier,
}

impl std::fmt::Debug for ProcessingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProcessingGuard")
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        let finished = {
            let mut inner = lock(&self.inner);
            if inner.phase == RecordingPhase::Processing {
                inner.phase = RecordingPhase::Idle;
                true
            } else {
                false
            }
        };
        if finished {
            (self.notify)(VoiceEvent::ProcessingFinished);
        }
    }
}

/// Returns the recorder to idle if a start is abandoned while the
/// microphone is being acquired
struct StartingGuard<'a> {
    inner: &'a Mutex<RecorderInner>,
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        if inner.phase == RecordingPhase::Starting {
            inner.phase = RecordingPhase::Idle;
        }
    }
}

struct ActiveCapture {
    stream: Box<dyn CaptureStream>,
    analyser: FrequencyAnalyser,
    tasks: Vec<JoinHandle<()>>,
    done: oneshot::Sender<Result<(AudioClip, StopReason)>>,
}

struct RecorderInner {
    phase: RecordingPhase,
    duration_secs: u64,
    generation: u64,
    capture: Option<ActiveCapture>,
}

impl std::fmt::Debug for RecorderInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderInner")
            .field("phase", &self.phase)
            .field("duration_secs", &self.duration_secs)
            .field("generation", &self.generation)
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}

/// Records one clip at a time from an [`AudioDevice`]
pub struct AudioRecorder {
    device: Arc<dyn AudioDevice>,
    settings: SilenceSettings,
    inner: Arc<Mutex<RecorderInner>>,
    notify: VoiceNotifier,
}

impl AudioRecorder {
    #[must_use]
    pub fn new(device: Arc<dyn AudioDevice>, settings: SilenceSettings, notify: VoiceNotifier) -> Self {
        Self {
            device,
            settings,
            inner: Arc::new(Mutex::new(RecorderInner {
                phase: RecordingPhase::Idle,
                duration_secs: 0,
                generation: 0,
                capture: None,
            })),
            notify,
        }
    }

    #[must_use]
    pub fn status(&self) -> RecordingStatus {
        let inner = lock(&self.inner);
        RecordingStatus {
            phase: inner.phase,
            duration_secs: inner.duration_secs,
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.status().is_recording()
    }

    /// Acquire the microphone and start recording
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordingInProgress`] unless idle, or
    /// [`Error::Microphone`] if the microphone cannot be acquired; the
    /// recorder stays idle in both cases. Dropping the future before the
    /// microphone opens also leaves it idle.
    pub async fn start(&self) -> Result<CaptureHandle> {
        {
            let mut inner = lock(&self.inner);
            if inner.phase != RecordingPhase::Idle {
                return Err(Error::RecordingInProgress);
            }
            inner.phase = RecordingPhase::Starting;
        }
        let _starting = StartingGuard { inner: &self.inner };

        let stream = match self.device.open_microphone().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "could not start recording");
                return Err(match e {
                    Error::Microphone(_) => e,
                    other => Error::Microphone(other.to_string()),
                });
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut inner = lock(&self.inner);
            inner.generation += 1;
            let generation = inner.generation;

            let tasks = vec![
                self.spawn_duration_counter(generation),
                self.spawn_silence_monitor(generation),
            ];

            inner.capture = Some(ActiveCapture {
                stream,
                analyser: FrequencyAnalyser::new(self.settings.fft_size, self.settings.smoothing),
                tasks,
                done: done_tx,
            });
            inner.phase = RecordingPhase::Recording;
            inner.duration_secs = 0;
        }

        tracing::debug!("recording started");
        (self.notify)(VoiceEvent::RecordingStarted);

        Ok(CaptureHandle {
            done: done_rx,
            inner: Arc::clone(&self.inner),
            notify: Arc::clone(&self.notify),
        })
    }

    /// Stop the current recording and hand the clip to its [`CaptureHandle`]
    ///
    /// Returns false (and does nothing) when not recording.
    pub fn stop(&self) -> bool {
        finalize(&self.inner, None, StopReason::Manual, &self.notify)
    }

    fn spawn_duration_counter(&self, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let notify = Arc::clone(&self.notify);
        let started = Instant::now();

        tokio::spawn(async move {
            let second = Duration::from_secs(1);
            let mut ticker = tokio::time::interval_at(started + second, second);
            loop {
                ticker.tick().await;
                let seconds = {
                    let mut guard = lock(&inner);
                    if guard.generation != generation || guard.capture.is_none() {
                        return;
                    }
                    guard.duration_secs = started.elapsed().as_secs();
                    guard.duration_secs
                };
                notify(VoiceEvent::RecordingTick { seconds });
            }
        })
    }

    fn spawn_silence_monitor(&self, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let notify = Arc::clone(&self.notify);
        let settings = self.settings.clone();

        tokio::spawn(async move {
            tokio::time::sleep(settings.grace_period).await;

            let mut detector = SilenceDetector::from_settings(&settings, Instant::now());
            let mut ticker = tokio::time::interval(settings.poll_interval);

            loop {
                ticker.tick().await;
                let level = {
                    let mut guard = lock(&inner);
                    if guard.generation != generation {
                        return;
                    }
                    let Some(capture) = guard.capture.as_mut() else {
                        return;
                    };
                    let samples = capture.stream.recent_samples(capture.analyser.fft_size());
                    capture.analyser.average_level(&samples)
                };

                tracing::trace!(level, "audio level");

                if detector.observe(level, Instant::now()) {
                    tracing::info!(
                        quiet_ms = u64::try_from(detector.quiet_for(Instant::now()).as_millis())
                            .unwrap_or(u64::MAX),
                        "auto-stopping recording after silence"
                    );
                    finalize(&inner, Some(generation), StopReason::Silence, &notify);
                    return;
                }
            }
        })
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        // Release the microphone if the owner goes away mid-recording
        let capture = lock(&self.inner).capture.take();
        if let Some(capture) = capture {
            for task in &capture.tasks {
                task.abort();
            }
            drop(capture.stream);
        }
    }
}

/// End the active capture, release its resources and deliver the clip
///
/// `generation` restricts finalizing to a specific recording (used by the
/// silence monitor so it never stops a newer one).
fn finalize(
    inner: &Arc<Mutex<RecorderInner>>,
    generation: Option<u64>,
    reason: StopReason,
    notify: &VoiceNotifier,
) -> bool {
    let (capture, sample_rate) = {
        let mut guard = lock(inner);
        if generation.is_some_and(|g| g != guard.generation) {
            return false;
        }
        let Some(capture) = guard.capture.take() else {
            return false;
        };
        guard.duration_secs = 0;
        guard.phase = RecordingPhase::Processing;
        let sample_rate = capture.stream.sample_rate();
        (capture, sample_rate)
    };

    let ActiveCapture {
        stream,
        analyser,
        tasks,
        done,
    } = capture;

    for task in &tasks {
        task.abort();
    }
    drop(analyser);
    let result = stream.finish();

    match &result {
        Ok(clip) => tracing::debug!(
            bytes = clip.data.len(),
            sample_rate,
            ?reason,
            "recording finalized"
        ),
        Err(e) => tracing::error!(error = %e, "failed to finalize recording"),
    }

    let failed = result.is_err();
    notify(VoiceEvent::RecordingStopped { reason });

    // Nobody waiting for the clip, or nothing to transcribe: back to idle
    if done.send(result.map(|clip| (clip, reason))).is_err() || failed {
        lock(inner).phase = RecordingPhase::Idle;
        notify(VoiceEvent::ProcessingFinished);
    } else {
        notify(VoiceEvent::ProcessingStarted);
    }

    true
}

fn lock(inner: &Mutex<RecorderInner>) -> MutexGuard<'_, RecorderInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
