//! Spoken reply output
//!
//! Synthesis plus playback behind one seam. `speak` returns only after the
//! audio has finished playing — recording must never overlap playback on
//! half-duplex hardware.

use async_trait::async_trait;

use crate::Result;

use super::playback::AudioPlayback;
use super::tts::TextToSpeech;

/// Speaks replies to the user
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Synthesize and play the given text, blocking until playback completes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails.
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// TTS-backed speech output on the default audio device
pub struct VoiceOutput {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl VoiceOutput {
    /// Combine a synthesis client with a playback device
    #[must_use]
    pub fn new(tts: TextToSpeech, playback: AudioPlayback) -> Self {
        Self { tts, playback }
    }
}

#[async_trait]
impl SpeechOutput for VoiceOutput {
    async fn speak(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        tracing::debug!(text, "speaking");
        let audio = self.tts.synthesize(text).await?;
        self.playback.play_mp3(&audio)
    }
}
