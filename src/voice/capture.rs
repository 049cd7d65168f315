//! Audio capture from the default microphone

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::oneshot;

use super::device::{AudioClip, AudioFormat, CaptureStream};
use crate::{Error, Result};

/// Preferred sample rate for capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// A running microphone capture
///
/// The cpal stream lives on its own thread; dropping the stop sender ends
/// that thread and with it the stream.
pub struct MicrophoneCapture {
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneCapture {
    /// Open the default input device and start buffering mono samples
    ///
    /// # Errors
    ///
    /// Returns [`Error::Microphone`] if no input device is available or the
    /// stream cannot be started
    pub async fn open(preferred_rate: u32) -> Result<Self> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_buffer = Arc::clone(&buffer);
        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture(preferred_rate, &thread_buffer, ready_tx, &stop_rx))
            .map_err(|e| Error::Microphone(e.to_string()))?;

        let sample_rate = ready_rx
            .await
            .map_err(|_| Error::Microphone("capture thread exited".to_string()))??;

        tracing::debug!(sample_rate, "audio capture started");

        Ok(Self {
            buffer,
            sample_rate,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn release(&mut self) {
        let Some(stop) = self.stop.take() else {
            return;
        };
        drop(stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        tracing::debug!("audio capture stopped");
    }
}

impl CaptureStream for MicrophoneCapture {
    fn recent_samples(&self, count: usize) -> Vec<f32> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let start = buffer.len().saturating_sub(count);
        buffer[start..].to_vec()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn finish(mut self: Box<Self>) -> Result<AudioClip> {
        self.release();
        let samples = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        let data = samples_to_wav(&samples, self.sample_rate)?;
        Ok(AudioClip::new(data, AudioFormat::Wav))
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_capture(
    preferred_rate: u32,
    buffer: &Arc<Mutex<Vec<f32>>>,
    ready: oneshot::Sender<Result<u32>>,
    stop: &mpsc::Receiver<()>,
) {
    let stream = match build_input_stream(preferred_rate, buffer) {
        Ok((stream, sample_rate)) => {
            if ready.send(Ok(sample_rate)).is_err() {
                // Opener went away before the stream was handed over
                return;
            }
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Blocks until the sender is dropped
    while stop.recv().is_ok() {}
    drop(stream);
}

#[allow(clippy::cast_precision_loss)]
fn build_input_stream(
    preferred_rate: u32,
    buffer: &Arc<Mutex<Vec<f32>>>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Microphone("no input device available".to_string()))?;

    let config = input_config(&device, preferred_rate)?;
    let channels = usize::from(config.channels.max(1));
    let sample_rate = config.sample_rate.0;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio capture initialized"
    );

    let buffer = Arc::clone(buffer);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                if channels == 1 {
                    buf.extend_from_slice(data);
                } else {
                    buf.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                    );
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Microphone(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::Microphone(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// Mono at the preferred rate if supported, otherwise the device default
fn input_config(device: &cpal::Device, preferred_rate: u32) -> Result<StreamConfig> {
    let preferred = device
        .supported_input_configs()
        .map_err(|e| Error::Microphone(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(preferred_rate)
                && c.max_sample_rate() >= SampleRate(preferred_rate)
        });

    if let Some(supported) = preferred {
        return Ok(supported.with_sample_rate(SampleRate(preferred_rate)).config());
    }

    device
        .default_input_config()
        .map(|c| c.config())
        .map_err(|e| Error::Microphone(e.to_string()))
}

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_and_length() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5, 1.0], 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44 byte header + 4 samples * 2 bytes
        assert_eq!(wav.len(), 52);
    }

    #[test]
    fn test_wav_clamps_out_of_range() {
        let wav = samples_to_wav(&[2.0, -2.0], 8000).unwrap();
        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![32767, -32768]);
    }
}
