//! Playback of synthesized speech
//!
//! At most one clip is loaded at a time. Presenting a new clip halts and
//! releases the previous one first. A clip whose autoplay is refused stays
//! loaded as pending until [`AudioPlayer::play_pending`] or
//! [`AudioPlayer::stop`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::device::{AudioClip, AudioDevice, PlayError, PlayTrigger, PlaybackEnd, PlaybackResource};
use super::{VoiceEvent, VoiceNotifier};
use crate::Result;

/// What the player is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    /// Loaded, waiting for a user gesture
    Pending,
}

struct Loaded {
    resource: Box<dyn PlaybackResource>,
    phase: PlaybackPhase,
    generation: u64,
}

#[derive(Default)]
struct PlayerInner {
    current: Option<Loaded>,
    generation: u64,
}

/// Single-slot audio player
pub struct AudioPlayer {
    device: Arc<dyn AudioDevice>,
    inner: Arc<Mutex<PlayerInner>>,
    notify: VoiceNotifier,
}

impl AudioPlayer {
    #[must_use]
    pub fn new(device: Arc<dyn AudioDevice>, notify: VoiceNotifier) -> Self {
        Self {
            device,
            inner: Arc::new(Mutex::new(PlayerInner::default())),
            notify,
        }
    }

    #[must_use]
    pub fn phase(&self) -> PlaybackPhase {
        lock(&self.inner)
            .current
            .as_ref()
            .map_or(PlaybackPhase::Idle, |loaded| loaded.phase)
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.phase() == PlaybackPhase::Playing
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.phase() == PlaybackPhase::Pending
    }

    /// Load a clip and try to autoplay it, replacing whatever was loaded
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be loaded; anything previously
    /// loaded is left untouched in that case
    pub fn present(&self, clip: AudioClip) -> Result<PlaybackPhase> {
        let resource = self.device.load(clip)?;

        let mut inner = lock(&self.inner);
        if let Some(previous) = inner.current.take() {
            tracing::debug!("superseding previous playback");
            previous.resource.halt();
        }
        inner.generation += 1;
        let generation = inner.generation;

        match resource.play(PlayTrigger::Autoplay) {
            Ok(ended) => {
                inner.current = Some(Loaded {
                    resource,
                    phase: PlaybackPhase::Playing,
                    generation,
                });
                drop(inner);
                self.watch(generation, ended);
                (self.notify)(VoiceEvent::PlaybackStarted);
                Ok(PlaybackPhase::Playing)
            }
            Err(PlayError::Blocked) => {
                tracing::info!("autoplay blocked, waiting for user gesture");
                inner.current = Some(Loaded {
                    resource,
                    phase: PlaybackPhase::Pending,
                    generation,
                });
                drop(inner);
                (self.notify)(VoiceEvent::PlaybackPending);
                Ok(PlaybackPhase::Pending)
            }
            Err(PlayError::Failed(reason)) => {
                drop(inner);
                tracing::warn!(reason = %reason, "playback failed to start");
                drop(resource);
                (self.notify)(VoiceEvent::PlaybackEnded);
                Ok(PlaybackPhase::Idle)
            }
        }
    }

    /// Play the clip left pending by a blocked autoplay
    ///
    /// Returns false when nothing is pending.
    pub fn play_pending(&self) -> bool {
        let mut inner = lock(&self.inner);
        let Some(loaded) = inner.current.as_mut() else {
            return false;
        };
        if loaded.phase != PlaybackPhase::Pending {
            return false;
        }

        match loaded.resource.play(PlayTrigger::UserGesture) {
            Ok(ended) => {
                loaded.phase = PlaybackPhase::Playing;
                let generation = loaded.generation;
                drop(inner);
                self.watch(generation, ended);
                (self.notify)(VoiceEvent::PlaybackStarted);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "pending playback failed");
                let released = inner.current.take();
                drop(inner);
                drop(released);
                (self.notify)(VoiceEvent::PlaybackEnded);
                false
            }
        }
    }

    /// Halt and release whatever is loaded
    ///
    /// Returns false (and does nothing) when the player is empty.
    pub fn stop(&self) -> bool {
        let released = lock(&self.inner).current.take();
        let Some(loaded) = released else {
            return false;
        };
        loaded.resource.halt();
        drop(loaded);
        tracing::debug!("playback stopped");
        (self.notify)(VoiceEvent::PlaybackEnded);
        true
    }

    /// Release the resource once it finishes on its own
    fn watch(&self, generation: u64, ended: oneshot::Receiver<PlaybackEnd>) {
        let inner = Arc::clone(&self.inner);
        let notify = Arc::clone(&self.notify);

        tokio::spawn(async move {
            match ended.await {
                Ok(PlaybackEnd::Completed) => tracing::debug!("playback completed"),
                Ok(PlaybackEnd::Failed(reason)) => {
                    tracing::warn!(reason = %reason, "playback failed");
                }
                // Resource dropped before reporting; it was superseded or stopped
                Err(_) => {}
            }

            let released = {
                let mut guard = lock(&inner);
                if guard
                    .current
                    .as_ref()
                    .is_some_and(|loaded| loaded.generation == generation)
                {
                    guard.current.take()
                } else {
                    None
                }
            };
            if released.is_some() {
                drop(released);
                notify(VoiceEvent::PlaybackEnded);
            }
        });
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        if let Some(loaded) = lock(&self.inner).current.take() {
            loaded.resource.halt();
        }
    }
}

fn lock(inner: &Mutex<PlayerInner>) -> MutexGuard<'_, PlayerInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
