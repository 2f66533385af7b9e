//! Audio capture from the microphone
//!
//! One physical input device feeds any number of logical subscribers, each
//! with its own sample buffer. Arbitration elsewhere guarantees only one
//! subscriber is actively consuming at a time; the fan-out exists so
//! staggered spotting cycles never share mutable decode state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::{Error, Result};

/// Default capture sample rate (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Per-subscriber buffer cap in seconds; older audio is dropped
const MAX_BUFFERED_SECS: u32 = 10;

/// A timestamped block of mono PCM samples
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in the range [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// When the frame was handed to the consumer
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl AudioFrame {
    /// Wall-clock duration of the frame
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Source of fixed-duration audio chunks
///
/// The live implementation blocks for the chunk duration while samples
/// accumulate; test implementations return immediately.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Sample rate of returned frames
    fn sample_rate(&self) -> u32;

    /// Capture the next chunk of roughly the given wall-clock duration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the audio device is gone.
    async fn next_chunk(&mut self, duration: Duration) -> Result<AudioFrame>;

    /// Drop any audio buffered while this source was not being consumed
    fn discard_pending(&mut self) {}
}

type SharedBuffer = Arc<Mutex<Vec<f32>>>;

/// Captures audio from the default input device
pub struct AudioCapture {
    config: StreamConfig,
    device_rate: u32,
    target_rate: u32,
    subscribers: Arc<Mutex<Vec<SharedBuffer>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device at the requested rate
    ///
    /// If the device does not support the requested rate, the nearest
    /// supported mono rate is negotiated instead and captured audio is
    /// resampled back to the requested rate on delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if no input device or no mono input config
    /// is available.
    pub fn new(requested_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let ranges: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .filter(|c| c.channels() == 1)
            .collect();

        if ranges.is_empty() {
            return Err(Error::Device("no mono input config available".to_string()));
        }

        // Prefer the requested rate; otherwise clamp into the closest range
        let device_rate = ranges
            .iter()
            .find(|c| {
                c.min_sample_rate() <= SampleRate(requested_rate)
                    && c.max_sample_rate() >= SampleRate(requested_rate)
            })
            .map_or_else(
                || {
                    ranges
                        .iter()
                        .map(|c| {
                            requested_rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0)
                        })
                        .min_by_key(|rate| rate.abs_diff(requested_rate))
                        .unwrap_or(requested_rate)
                },
                |_| requested_rate,
            );

        let supported = ranges
            .iter()
            .find(|c| {
                c.min_sample_rate() <= SampleRate(device_rate)
                    && c.max_sample_rate() >= SampleRate(device_rate)
            })
            .cloned()
            .ok_or_else(|| Error::Device("no suitable audio config found".to_string()))?;

        let config = supported.with_sample_rate(SampleRate(device_rate)).config();

        if device_rate == requested_rate {
            tracing::debug!(
                device = device.name().unwrap_or_default(),
                sample_rate = device_rate,
                "audio capture initialized"
            );
        } else {
            tracing::warn!(
                device = device.name().unwrap_or_default(),
                requested = requested_rate,
                negotiated = device_rate,
                "requested sample rate unsupported, capturing at negotiated rate"
            );
        }

        Ok(Self {
            config,
            device_rate,
            target_rate: requested_rate,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Register a new logical consumer of the capture stream
    #[must_use]
    pub fn subscribe(&self) -> LiveAudioSource {
        let buffer: SharedBuffer = Arc::new(Mutex::new(Vec::new()));
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(Arc::clone(&buffer));
        }

        LiveAudioSource {
            buffer,
            device_rate: self.device_rate,
            target_rate: self.target_rate,
        }
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let subscribers = Arc::clone(&self.subscribers);
        let max_buffered = (self.device_rate * MAX_BUFFERED_SECS) as usize;

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(subscribers) = subscribers.lock() {
                        for buffer in subscribers.iter() {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.extend_from_slice(data);
                                // Unconsumed subscribers must not grow without bound
                                if buf.len() > max_buffered {
                                    let excess = buf.len() - max_buffered;
                                    buf.drain(..excess);
                                }
                            }
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Negotiated device sample rate
    #[must_use]
    pub const fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

/// One subscriber's view of the live capture stream
pub struct LiveAudioSource {
    buffer: SharedBuffer,
    device_rate: u32,
    target_rate: u32,
}

#[async_trait]
impl AudioSource for LiveAudioSource {
    fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    async fn next_chunk(&mut self, duration: Duration) -> Result<AudioFrame> {
        // Samples accumulate in real time; wait out the chunk, then drain.
        tokio::time::sleep(duration).await;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wanted = (duration.as_secs_f64() * f64::from(self.device_rate)) as usize;

        let samples: Vec<f32> = {
            let mut buf = self
                .buffer
                .lock()
                .map_err(|_| Error::Device("capture buffer poisoned".to_string()))?;
            let take = wanted.min(buf.len());
            buf.drain(..take).collect()
        };

        let samples = if self.device_rate == self.target_rate {
            samples
        } else {
            resample(&samples, self.device_rate, self.target_rate)?
        };

        Ok(AudioFrame {
            samples,
            sample_rate: self.target_rate,
            captured_at: chrono::Utc::now(),
        })
    }

    fn discard_pending(&mut self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
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
            // Convert f32 [-1.0, 1.0] to i16
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

/// Resample mono audio between sample rates
///
/// # Errors
///
/// Returns error if the resampler cannot be constructed or fails.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    const CHUNK: usize = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(f64::from(to) / f64::from(from), 2.0, params, CHUNK, 1)
        .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let expected = samples.len() * to as usize / from as usize;
    let mut out = Vec::with_capacity(expected + CHUNK);

    let mut chunks = samples.chunks_exact(CHUNK);
    for chunk in &mut chunks {
        let mut frames = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        out.append(&mut frames[0]);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut frames = resampler
            .process_partial(Some(&[tail]), None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        out.append(&mut frames[0]);
    }

    Ok(out)
}
