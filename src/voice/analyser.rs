//! Frequency-domain level analysis of microphone audio
//!
//! Produces byte-scaled frequency data the way a browser analyser node does:
//! Blackman window, FFT, magnitude smoothing over time, then a decibel range
//! mapped onto 0..=255 per bin.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Lower end of the decibel range mapped to byte 0
const MIN_DECIBELS: f32 = -100.0;

/// Upper end of the decibel range mapped to byte 255
const MAX_DECIBELS: f32 = -30.0;

/// Byte-scaled spectrum analyser
pub struct FrequencyAnalyser {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothing: f32,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl FrequencyAnalyser {
    /// Create an analyser
    ///
    /// `fft_size` is rounded up to a power of two (minimum 32); `smoothing` is
    /// clamped to `0.0..=1.0`.
    #[must_use]
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft_size,
            fft,
            window: blackman_window(fft_size),
            smoothing: smoothing.clamp(0.0, 1.0),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    #[must_use]
    pub const fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins (half the FFT size)
    #[must_use]
    pub const fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Compute byte frequency data for the latest `fft_size` samples
    ///
    /// Shorter input is zero-padded at the front. `out` receives at most
    /// [`bin_count`](Self::bin_count) values.
    #[allow(clippy::cast_precision_loss)]
    pub fn byte_frequency_data(&mut self, samples: &[f32], out: &mut [u8]) {
        let start = samples.len().saturating_sub(self.fft_size);
        let recent = &samples[start..];
        let pad = self.fft_size - recent.len();

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { recent[i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * scale;
            *smoothed = tau.mul_add(*smoothed, (1.0 - tau) * magnitude);
        }

        for (value, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            *value = to_byte(magnitude);
        }
    }

    /// Mean of the byte frequency data for the latest samples
    #[allow(clippy::cast_precision_loss)]
    pub fn average_level(&mut self, samples: &[f32]) -> f32 {
        let mut bins = vec![0u8; self.bin_count()];
        self.byte_frequency_data(samples, &mut bins);
        let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
        sum as f32 / bins.len() as f32
    }
}

impl std::fmt::Debug for FrequencyAnalyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyAnalyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 / (MAX_DECIBELS - MIN_DECIBELS) * (db - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}

#[allow(clippy::cast_precision_loss)]
fn blackman_window(size: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1: f32 = 0.5;
    let a2 = 0.5 * ALPHA;
    let n = size as f32;

    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n;
            a2.mul_add((2.0 * x).cos(), a1.mul_add(-x.cos(), a0))
        })
        .collect()
}
