//! Configuration management for brewvoice
//!
//! A resolved [`Config`] is built from defaults, the optional TOML overlay
//! file, and environment variables. Thresholds and durations are deployment
//! tunables — ambient noise floors and microphone gain vary too much between
//! rigs for hard-coded policy.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Brewvoice configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake keywords, matched lowercase as substrings of a window transcript
    pub keywords: Vec<String>,

    /// Audio capture configuration
    pub audio: AudioConfig,

    /// Utterance segmentation configuration
    pub vad: VadConfig,

    /// Keyword spotting configuration
    pub spotter: SpotterConfig,

    /// Remote assistant configuration
    pub agent: AgentConfig,

    /// STT/TTS configuration
    pub speech: SpeechConfig,

    /// OpenAI API key (`OPENAI_API_KEY`); wrapped in a secret at use sites
    pub api_key: Option<String>,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Requested capture sample rate in Hz; the device may negotiate another
    /// rate, in which case captured audio is resampled back to this one
    pub sample_rate: u32,
}

/// Adaptive silence segmentation parameters
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// Wall-clock duration of one analysis chunk
    pub chunk_duration: Duration,

    /// RMS energy at or above which a chunk counts as speech
    pub speech_threshold: f32,

    /// Trailing silence that ends an utterance
    pub silence_duration: Duration,

    /// How long to wait for speech to start before giving up
    pub max_wait: Duration,
}

/// Keyword spotting configuration
#[derive(Debug, Clone)]
pub struct SpotterConfig {
    /// Number of concurrent spotting cycles
    pub cycles: usize,

    /// Audio window captured per recognition pass
    pub window: Duration,

    /// Startup delay per cycle; staggered windows catch phrases that
    /// straddle window boundaries
    pub stagger: Vec<Duration>,

    /// Pause after losing arbitration or while the session is busy
    pub backoff: Duration,

    /// RMS energy below which a window skips transcription entirely
    pub energy_threshold: f32,
}

/// Remote assistant configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Assistant id to run conversations against
    pub assistant_id: String,

    /// Text submitted as the first user turn when a session opens
    pub opening_line: String,

    /// Interval between run status polls
    pub poll_interval: Duration,

    /// Upper bound on one run; exceeding it is treated as a failed run
    pub run_deadline: Duration,

    /// Phrases that end the session when present in a transcript
    pub exit_phrases: Vec<String>,

    /// Spoken when the session ends normally
    pub farewell_line: String,

    /// Spoken when a run fails or times out
    pub apology_line: String,
}

/// Speech service configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Transcription model (e.g. "whisper-1")
    pub stt_model: String,

    /// Synthesis model (e.g. "tts-1")
    pub tts_model: String,

    /// Synthesis voice identifier
    pub tts_voice: String,

    /// Synthesis speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: vec![
                "brew system".to_string(),
                "bruce system".to_string(),
                "bruce".to_string(),
            ],
            audio: AudioConfig { sample_rate: 16_000 },
            vad: VadConfig::default(),
            spotter: SpotterConfig::default(),
            agent: AgentConfig::default(),
            speech: SpeechConfig::default(),
            api_key: None,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_millis(500),
            speech_threshold: 0.015,
            silence_duration: Duration::from_millis(1500),
            max_wait: Duration::from_secs(6),
        }
    }
}

impl Default for SpotterConfig {
    fn default() -> Self {
        Self {
            cycles: 2,
            window: Duration::from_millis(1700),
            stagger: vec![Duration::ZERO, Duration::from_millis(850)],
            backoff: Duration::from_secs(1),
            energy_threshold: 0.01,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            assistant_id: String::new(),
            opening_line: "Hey Brewsystem".to_string(),
            poll_interval: Duration::from_secs(1),
            run_deadline: Duration::from_secs(120),
            exit_phrases: vec![
                "exit".to_string(),
                "quit".to_string(),
                "stop".to_string(),
                "end conversation".to_string(),
            ],
            farewell_line: "Goodbye!".to_string(),
            apology_line: "Sorry, I ran into a problem talking to the assistant. Goodbye for now."
                .to_string(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

impl Config {
    /// Load configuration from the overlay file and environment
    ///
    /// `path` overrides the default config file location. A missing file is
    /// not an error — defaults apply.
    ///
    /// # Errors
    ///
    /// Returns error if an existing config file cannot be read or parsed, or
    /// a field fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let overlay = match path {
            Some(p) => file::read_config_file(p)?,
            None => file::load_default_config_file()?,
        };

        let mut config = Self::default();
        overlay.apply(&mut config);

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(id) = std::env::var("BREWVOICE_ASSISTANT_ID") {
            if !id.is_empty() {
                config.agent.assistant_id = id;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns error on empty keyword set, zero spotting cycles, or a
    /// non-positive chunk duration.
    pub fn validate(&self) -> Result<()> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(Error::Config("at least one wake keyword required".to_string()));
        }
        if self.spotter.cycles == 0 {
            return Err(Error::Config("spotter.cycles must be at least 1".to_string()));
        }
        if self.vad.chunk_duration.is_zero() {
            return Err(Error::Config("vad.chunk_duration must be positive".to_string()));
        }
        if self.agent.poll_interval.is_zero() {
            return Err(Error::Config("agent.poll_interval must be positive".to_string()));
        }
        Ok(())
    }

}

impl SpotterConfig {
    /// Startup delay for the given spotting cycle index
    ///
    /// Cycles beyond the configured stagger list start immediately.
    #[must_use]
    pub fn stagger_for(&self, index: usize) -> Duration {
        self.stagger.get(index).copied().unwrap_or(Duration::ZERO)
    }
}
