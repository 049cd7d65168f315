//! Audio playback to the default speaker

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::oneshot;

use super::device::{AudioClip, AudioFormat, PlayError, PlayTrigger, PlaybackEnd, PlaybackResource};
use crate::{Error, Result};

/// How often the playback thread checks for completion or halt
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Decoded mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A decoded clip ready to play on the default output device
pub struct SpeakerClip {
    audio: Arc<DecodedAudio>,
    autoplay: bool,
    halted: Arc<AtomicBool>,
    started: Mutex<bool>,
}

impl SpeakerClip {
    /// Decode a clip for playback
    ///
    /// `autoplay` false makes unsolicited playback report
    /// [`PlayError::Blocked`].
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be decoded
    pub fn load(clip: &AudioClip, autoplay: bool) -> Result<Self> {
        let audio = decode(clip)?;
        tracing::debug!(
            samples = audio.samples.len(),
            sample_rate = audio.sample_rate,
            "clip loaded"
        );
        Ok(Self {
            audio: Arc::new(audio),
            autoplay,
            halted: Arc::new(AtomicBool::new(false)),
            started: Mutex::new(false),
        })
    }
}

impl PlaybackResource for SpeakerClip {
    fn play(&self, trigger: PlayTrigger) -> std::result::Result<oneshot::Receiver<PlaybackEnd>, PlayError> {
        if trigger == PlayTrigger::Autoplay && !self.autoplay {
            return Err(PlayError::Blocked);
        }

        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if *started {
            return Err(PlayError::Failed("clip already played".to_string()));
        }

        let (ended_tx, ended_rx) = oneshot::channel();
        let audio = Arc::clone(&self.audio);
        let halted = Arc::clone(&self.halted);

        std::thread::Builder::new()
            .name("speaker-playback".to_string())
            .spawn(move || {
                let end = match play_blocking(&audio, &halted) {
                    Ok(()) => PlaybackEnd::Completed,
                    Err(e) => PlaybackEnd::Failed(e.to_string()),
                };
                let _ = ended_tx.send(end);
            })
            .map_err(|e| PlayError::Failed(e.to_string()))?;

        *started = true;
        Ok(ended_rx)
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}

impl Drop for SpeakerClip {
    fn drop(&mut self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}

fn play_blocking(audio: &DecodedAudio, halted: &AtomicBool) -> Result<()> {
    if audio.samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

    let config = output_config(&device, audio.sample_rate)?;
    let channels = usize::from(config.channels.max(1));
    let output_rate = config.sample_rate.0;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        clip_rate = audio.sample_rate,
        output_rate,
        channels,
        "audio playback initialized"
    );

    let samples = resample(&audio.samples, audio.sample_rate, output_rate)?;
    let total = samples.len();
    let position = Arc::new(AtomicUsize::new(0));
    let callback_position = Arc::clone(&position);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = callback_position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(pos).copied().unwrap_or(0.0);
                    frame.fill(sample);
                    if pos < samples.len() {
                        pos += 1;
                    }
                }
                callback_position.store(pos, Ordering::Relaxed);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    while position.load(Ordering::Relaxed) < total {
        if halted.load(Ordering::SeqCst) {
            tracing::debug!("playback halted");
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);
    tracing::debug!(samples = total, "playback complete");

    Ok(())
}

/// Mono (or stereo) at the clip rate if supported, otherwise the device default
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.sample_format() == cpal::SampleFormat::F32
            && c.min_sample_rate() <= SampleRate(sample_rate)
            && c.max_sample_rate() >= SampleRate(sample_rate)
    };

    let configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .collect();

    let matching = configs
        .iter()
        .find(|c| supports(c, 1))
        .or_else(|| configs.iter().find(|c| supports(c, 2)));

    if let Some(supported) = matching {
        return Ok(supported.clone().with_sample_rate(SampleRate(sample_rate)).config());
    }

    device
        .default_output_config()
        .map(|c| c.config())
        .map_err(|e| Error::Playback(e.to_string()))
}

/// Convert mono samples to the output device rate with rubato
///
/// The resampler's filter delay is trimmed so the result lines up with the
/// input and has `len * to / from` samples.
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f32>::new(from as usize, to as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Playback(format!("resampler init failed: {e}")))?;

    let expected = (samples.len() as u64 * u64::from(to) / u64::from(from)) as usize;
    let mut output = Vec::with_capacity(expected + resampler.output_delay() + chunk_size);

    let mut chunks = samples.chunks_exact(chunk_size);
    for chunk in &mut chunks {
        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }

    // Zero-pad the tail, then flush until the delayed samples are out
    let tail: [&[f32]; 1] = [chunks.remainder()];
    let frames = resampler
        .process_partial(Some(&tail[..]), None)
        .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
    output.extend_from_slice(&frames[0]);
    while output.len() < expected + resampler.output_delay() {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    let delay = resampler.output_delay();
    Ok(output.into_iter().skip(delay).take(expected).collect())
}

/// Decode a clip to mono f32 samples
///
/// # Errors
///
/// Returns error if the payload is not valid audio in its declared format
pub fn decode(clip: &AudioClip) -> Result<DecodedAudio> {
    match clip.format {
        AudioFormat::Mp3 => decode_mp3(&clip.data),
        AudioFormat::Wav => decode_wav(&clip.data),
    }
}

fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }
                let channels = frame.channels.max(1);
                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    #[allow(clippy::cast_precision_loss)]
                    let count = chunk.len() as f32;
                    chunk.iter().map(|&s| f32::from(s) / 32768.0).sum::<f32>() / count
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Playback("no MP3 frames found".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

#[allow(clippy::cast_precision_loss)]
fn decode_wav(wav_data: &[u8]) -> Result<DecodedAudio> {
    let reader =
        hound::WavReader::new(Cursor::new(wav_data)).map_err(|e| Error::Playback(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Playback(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << spec.bits_per_sample.saturating_sub(1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Playback(e.to_string()))?
        }
    };

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::samples_to_wav;

    #[test]
    fn test_decode_wav_roundtrips_level() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5], 24000).unwrap();
        let audio = decode(&AudioClip::new(wav, AudioFormat::Wav)).unwrap();
        assert_eq!(audio.sample_rate, 24000);
        assert_eq!(audio.samples.len(), 3);
        assert!((audio.samples[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(&AudioClip::new(b"not audio".to_vec(), AudioFormat::Wav)).is_err());
        assert!(decode(&AudioClip::new(Vec::new(), AudioFormat::Mp3)).is_err());
    }

    #[test]
    fn test_resample_keeps_duration() {
        let samples = vec![0.25_f32; 2500];
        assert_eq!(resample(&samples, 48000, 24000).unwrap().len(), 1250);
        assert_eq!(resample(&samples, 16000, 48000).unwrap().len(), 7500);
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_resample_interpolates_upsampled_tone() {
        // 200 Hz at 16 kHz, upsampled to 48 kHz
        let tone: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16000.0).sin() * 0.5)
            .collect();
        let out = resample(&tone, 16000, 48000).unwrap();
        assert_eq!(out.len(), 14400);

        // Away from the edges, neighbours differ smoothly instead of in
        // repeated steps, and the result tracks the ideal waveform
        let middle = &out[3000..11000];
        let repeats = middle.windows(2).filter(|w| w[0] == w[1]).count();
        assert!(repeats < middle.len() / 100, "{repeats} repeated samples");
        for (offset, &sample) in middle.iter().enumerate() {
            let t = (3000 + offset) as f32 / 48000.0;
            let ideal = (2.0 * std::f32::consts::PI * 200.0 * t).sin() * 0.5;
            assert!((sample - ideal).abs() < 0.1, "sample {offset}: {sample} vs {ideal}");
        }
    }

    #[test]
    fn test_autoplay_refused_when_disabled() {
        let wav = samples_to_wav(&[0.0; 16], 16000).unwrap();
        let clip = SpeakerClip::load(&AudioClip::new(wav, AudioFormat::Wav), false).unwrap();
        assert_eq!(clip.play(PlayTrigger::Autoplay).unwrap_err(), PlayError::Blocked);
    }
}
