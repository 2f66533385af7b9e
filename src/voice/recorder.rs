//! Adaptive utterance recording
//!
//! Segments one spoken turn out of the live stream using RMS energy: wait for
//! speech to start, then record until the trailing silence is long enough to
//! call the utterance finished. All thresholds and durations come from
//! [`VadConfig`] — the right values depend on the deployment's noise floor.

use std::time::Duration;

use crate::Result;
use crate::config::VadConfig;

use super::capture::AudioSource;

/// One bounded span of captured audio representing a single spoken turn
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Concatenated PCM samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Whether speech was observed before the wait timed out
    pub speech_detected: bool,
}

impl Utterance {
    /// Wall-clock duration of the captured audio
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Encode the utterance as WAV bytes for transcription
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        super::capture::samples_to_wav(&self.samples, self.sample_rate)
    }
}

/// Recording phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No speech yet; bail out after `max_wait`
    AwaitingSpeech,
    /// Speech observed; stop after `silence_duration` of trailing silence
    InSpeech,
}

/// Records one utterance at a time from an audio source
#[derive(Debug, Clone, Copy)]
pub struct UtteranceRecorder {
    vad: VadConfig,
}

impl UtteranceRecorder {
    /// Create a recorder with the given segmentation parameters
    #[must_use]
    pub const fn new(vad: VadConfig) -> Self {
        Self { vad }
    }

    /// Record the next utterance
    ///
    /// Returns `speech_detected = false` with whatever partial buffer was
    /// captured if no chunk crosses the speech threshold within `max_wait`.
    /// Trailing silence chunks stay in the buffer so word endings are not
    /// truncated.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Device`] if the audio source fails.
    pub async fn record(&self, source: &mut dyn AudioSource) -> Result<Utterance> {
        let sample_rate = source.sample_rate();
        let chunk = self.vad.chunk_duration;

        let mut samples = Vec::new();
        let mut phase = Phase::AwaitingSpeech;
        let mut waited = Duration::ZERO;
        let mut trailing_silence = Duration::ZERO;

        loop {
            let frame = source.next_chunk(chunk).await?;
            let energy = rms(&frame.samples);
            let is_speech = energy >= self.vad.speech_threshold;
            samples.extend_from_slice(&frame.samples);

            tracing::trace!(?phase, energy, is_speech, buffered = samples.len(), "vad chunk");

            match phase {
                Phase::AwaitingSpeech => {
                    if is_speech {
                        phase = Phase::InSpeech;
                        trailing_silence = Duration::ZERO;
                    } else {
                        waited += chunk;
                        if waited >= self.vad.max_wait {
                            tracing::debug!("no speech within max wait");
                            return Ok(Utterance {
                                samples,
                                sample_rate,
                                speech_detected: false,
                            });
                        }
                    }
                }
                Phase::InSpeech => {
                    if is_speech {
                        trailing_silence = Duration::ZERO;
                    } else {
                        trailing_silence += chunk;
                        if trailing_silence >= self.vad.silence_duration {
                            tracing::debug!(
                                duration_ms = samples.len() * 1000 / sample_rate as usize,
                                "utterance complete"
                            );
                            return Ok(Utterance {
                                samples,
                                sample_rate,
                                speech_detected: true,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// RMS energy of a block of samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
