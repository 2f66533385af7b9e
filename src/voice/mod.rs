//! Voice processing module
//!
//! Audio capture and playback, adaptive utterance recording, keyword
//! spotting, and the STT/TTS clients.

mod capture;
mod playback;
mod recorder;
mod speech;
mod spotter;
mod stt;
mod tts;

pub use capture::{
    AudioCapture, AudioFrame, AudioSource, LiveAudioSource, SAMPLE_RATE, resample, samples_to_wav,
};
pub use playback::AudioPlayback;
pub use recorder::{Utterance, UtteranceRecorder, rms};
pub use speech::{SpeechOutput, VoiceOutput};
pub use spotter::{
    ConversationLauncher, KeywordSet, KeywordSpotter, Recognizer, WindowRecognizer,
};
pub use stt::{SpeechToText, Transcriber};
pub use tts::TextToSpeech;
