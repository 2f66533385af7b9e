//! Error types for brewvoice

use thiserror::Error;

/// Result type alias for brewvoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in brewvoice
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device unavailable or misconfigured — fatal to the affected
    /// spotting cycle
    #[error("device error: {0}")]
    Device(String),

    /// Audio processing error (encoding, resampling, playback)
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error — recovered within a turn as "no speech"
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Remote assistant run error — ends the session with a spoken apology
    #[error("agent error: {0}")]
    Agent(String),

    /// Actuation dispatch error — converted into a textual tool result
    #[error("tool error: {0}")]
    Tool(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
