//! Brewvoice — voice control front-end for a brewing rig
//!
//! This library provides the voice command pipeline for a physical brewing
//! rig controller:
//! - Continuous wake keyword spotting over the live microphone
//! - Adaptive silence-based utterance recording
//! - Single-flight session arbitration (one conversation, one mic consumer)
//! - A dialogue session driving remote assistant runs, including rig
//!   actuation tool calls
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Microphone                         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Spotting cycles ──► Session arbiter ──► Dialogue   │
//! │   (keyword match)     (single-flight)     session    │
//! └────────────────────┬──────────────┬─────────────────┘
//!                      │              │
//! ┌────────────────────▼───┐  ┌───────▼─────────────────┐
//! │  Remote assistant      │  │  Actuation gateway      │
//! │  (STT / runs / TTS)    │  │  (kettle, tank, pumps)  │
//! └────────────────────────┘  └─────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod session;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use events::{EventBus, SessionEvent};
pub use session::{
    Clock, ConversationTurn, DialogueSession, Role, SessionArbiter, SessionState, TokioClock,
};
pub use tools::{ActuationGateway, BrewRig, Unit};
pub use voice::{
    AudioFrame, AudioSource, KeywordSet, KeywordSpotter, Transcriber, Utterance, UtteranceRecorder,
};
