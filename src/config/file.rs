//! TOML configuration file loading
//!
//! Supports `~/.config/brewvoice/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::Result;

use super::Config;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Wake keywords
    #[serde(default)]
    pub keywords: Option<Vec<String>>,

    /// Audio capture settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Utterance segmentation settings
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Keyword spotting settings
    #[serde(default)]
    pub spotter: SpotterFileConfig,

    /// Remote assistant settings
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// STT/TTS settings
    #[serde(default)]
    pub speech: SpeechFileConfig,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,
}

/// Utterance segmentation configuration
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    /// Analysis chunk duration in milliseconds
    pub chunk_ms: Option<u64>,

    /// RMS speech threshold
    pub speech_threshold: Option<f32>,

    /// Trailing silence duration in milliseconds
    pub silence_ms: Option<u64>,

    /// Maximum wait for speech in seconds
    pub max_wait_secs: Option<u64>,
}

/// Keyword spotting configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpotterFileConfig {
    /// Number of concurrent spotting cycles
    pub cycles: Option<usize>,

    /// Recognition window in milliseconds
    pub window_ms: Option<u64>,

    /// Per-cycle startup delays in milliseconds
    pub stagger_ms: Option<Vec<u64>>,

    /// Contention backoff in milliseconds
    pub backoff_ms: Option<u64>,

    /// RMS gate below which a window is not transcribed
    pub energy_threshold: Option<f32>,
}

/// Remote assistant configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// Assistant id
    pub assistant_id: Option<String>,

    /// First user turn of a session
    pub opening_line: Option<String>,

    /// Run poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,

    /// Run deadline in seconds
    pub run_deadline_secs: Option<u64>,

    /// Session-ending phrases
    pub exit_phrases: Option<Vec<String>>,

    /// Farewell line
    pub farewell_line: Option<String>,

    /// Apology line for failed runs
    pub apology_line: Option<String>,
}

/// Speech service configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

impl ConfigFile {
    /// Overlay the file's values onto a resolved config
    pub fn apply(self, config: &mut Config) {
        if let Some(keywords) = self.keywords {
            config.keywords = keywords;
        }

        if let Some(rate) = self.audio.sample_rate {
            config.audio.sample_rate = rate;
        }

        if let Some(ms) = self.vad.chunk_ms {
            config.vad.chunk_duration = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.vad.speech_threshold {
            config.vad.speech_threshold = threshold;
        }
        if let Some(ms) = self.vad.silence_ms {
            config.vad.silence_duration = Duration::from_millis(ms);
        }
        if let Some(secs) = self.vad.max_wait_secs {
            config.vad.max_wait = Duration::from_secs(secs);
        }

        if let Some(cycles) = self.spotter.cycles {
            config.spotter.cycles = cycles;
        }
        if let Some(ms) = self.spotter.window_ms {
            config.spotter.window = Duration::from_millis(ms);
        }
        if let Some(stagger) = self.spotter.stagger_ms {
            config.spotter.stagger = stagger.into_iter().map(Duration::from_millis).collect();
        }
        if let Some(ms) = self.spotter.backoff_ms {
            config.spotter.backoff = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.spotter.energy_threshold {
            config.spotter.energy_threshold = threshold;
        }

        if let Some(id) = self.agent.assistant_id {
            config.agent.assistant_id = id;
        }
        if let Some(line) = self.agent.opening_line {
            config.agent.opening_line = line;
        }
        if let Some(ms) = self.agent.poll_interval_ms {
            config.agent.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.agent.run_deadline_secs {
            config.agent.run_deadline = Duration::from_secs(secs);
        }
        if let Some(phrases) = self.agent.exit_phrases {
            config.agent.exit_phrases = phrases;
        }
        if let Some(line) = self.agent.farewell_line {
            config.agent.farewell_line = line;
        }
        if let Some(line) = self.agent.apology_line {
            config.agent.apology_line = line;
        }

        if let Some(model) = self.speech.stt_model {
            config.speech.stt_model = model;
        }
        if let Some(model) = self.speech.tts_model {
            config.speech.tts_model = model;
        }
        if let Some(voice) = self.speech.tts_voice {
            config.speech.tts_voice = voice;
        }
        if let Some(speed) = self.speech.tts_speed {
            config.speech.tts_speed = speed;
        }
    }
}

/// Default config file path (`~/.config/brewvoice/config.toml`)
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "brewvoice")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if no file exists.
///
/// # Errors
///
/// Returns error if an existing file cannot be read or parsed.
pub fn load_default_config_file() -> Result<ConfigFile> {
    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    read_config_file(&path)
}

/// Read and parse a TOML config file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed.
pub fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&raw)?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(parsed)
}
