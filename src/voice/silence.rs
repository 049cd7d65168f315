//! Silence detection for auto-stopping a recording
//!
//! Uses a fixed level threshold and a fixed quiet window; there is no noise
//! floor calibration.

use std::time::Duration;

use tokio::time::Instant;

/// Level (mean byte frequency value) below which input counts as quiet
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 15.0;

/// Tunables for silence monitoring during a recording
#[derive(Debug, Clone, PartialEq)]
pub struct SilenceSettings {
    /// Mean byte frequency level below which input counts as quiet
    pub threshold: f32,
    /// Continuous quiet time that ends the recording
    ///
    /// Counted from the end of the grace period, or from the last reading at
    /// or above the threshold, so the earliest auto-stop comes at
    /// `grace_period + window` after recording starts.
    pub window: Duration,
    /// Delay after recording starts before monitoring begins
    pub grace_period: Duration,
    /// Interval between level samples
    pub poll_interval: Duration,
    /// Analyser FFT size
    pub fft_size: usize,
    /// Analyser time smoothing constant
    pub smoothing: f32,
}

impl Default for SilenceSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SILENCE_THRESHOLD,
            window: Duration::from_millis(2000),
            grace_period: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(100),
            fft_size: 512,
            smoothing: 0.8,
        }
    }
}

/// Tracks how long input has stayed below the threshold
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    threshold: f32,
    window: Duration,
    last_sound: Instant,
}

impl SilenceDetector {
    /// Start monitoring; the quiet window is measured from `now`
    #[must_use]
    pub const fn new(threshold: f32, window: Duration, now: Instant) -> Self {
        Self {
            threshold,
            window,
            last_sound: now,
        }
    }

    #[must_use]
    pub const fn from_settings(settings: &SilenceSettings, now: Instant) -> Self {
        Self::new(settings.threshold, settings.window, now)
    }

    /// Feed one level reading; returns true once the quiet window has elapsed
    pub fn observe(&mut self, level: f32, now: Instant) -> bool {
        if level >= self.threshold {
            self.last_sound = now;
            return false;
        }
        self.quiet_for(now) > self.window
    }

    /// Time since the last reading at or above the threshold
    #[must_use]
    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_sound)
    }
}
