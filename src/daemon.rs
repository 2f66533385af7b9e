//! Daemon — the voice control service
//!
//! Wires capture, keyword spotting, arbitration, and the dialogue session
//! together and runs until interrupted. The capture stream lives on the main
//! task (cpal streams aren't `Send`); spotting cycles run as spawned tasks
//! over their own capture subscriptions.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::watch;

use crate::agent::OpenAiAssistant;
use crate::config::{AgentConfig, Config, SpeechConfig, VadConfig};
use crate::events::EventBus;
use crate::session::{DialogueSession, SessionArbiter, TokioClock};
use crate::tools::BrewRig;
use crate::voice::{
    AudioCapture, AudioPlayback, AudioSource, ConversationLauncher, KeywordSet, KeywordSpotter,
    Recognizer, SpeechToText, TextToSpeech, Transcriber, UtteranceRecorder, VoiceOutput,
    WindowRecognizer,
};
use crate::{Error, Result};

/// The brewvoice daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if required configuration is missing or the audio
    /// device cannot be opened.
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;

        if self.config.agent.assistant_id.is_empty() {
            return Err(Error::Config(
                "agent.assistant_id is required (or set BREWVOICE_ASSISTANT_ID)".to_string(),
            ));
        }

        let events = EventBus::new();
        let arbiter = Arc::new(SessionArbiter::new(events.clone()));

        let transcriber: Arc<dyn Transcriber> = Arc::new(SpeechToText::new(
            SecretString::from(api_key.clone()),
            self.config.speech.stt_model.clone(),
        )?);
        let assistant = Arc::new(OpenAiAssistant::new(
            SecretString::from(api_key.clone()),
            self.config.agent.assistant_id.clone(),
        )?);
        let rig = Arc::new(BrewRig::new());

        let mut capture = AudioCapture::new(self.config.audio.sample_rate)?;

        // Subscribe every cycle before the stream starts so none misses audio
        let mut cycles: Vec<(Box<dyn AudioSource>, Box<dyn Recognizer>)> =
            Vec::with_capacity(self.config.spotter.cycles);
        for _ in 0..self.config.spotter.cycles {
            let source: Box<dyn AudioSource> = Box::new(capture.subscribe());
            let recognizer: Box<dyn Recognizer> = Box::new(WindowRecognizer::new(
                Arc::clone(&transcriber),
                self.config.spotter.energy_threshold,
            ));
            cycles.push((source, recognizer));
        }

        capture.start()?;

        let launcher = Arc::new(DaemonLauncher {
            agent: assistant,
            gateway: rig,
            transcriber,
            arbiter: Arc::clone(&arbiter),
            clock: TokioClock,
            agent_config: self.config.agent.clone(),
            vad: self.config.vad,
            speech: self.config.speech.clone(),
            api_key,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
        });

        let spotter = KeywordSpotter::new(
            KeywordSet::new(self.config.keywords.clone()),
            self.config.spotter.clone(),
            arbiter,
            events,
        );

        // Blocks until shutdown; all cycles are joined before this returns,
        // so the device is released deterministically
        spotter.run(cycles, launcher, shutdown_rx).await?;

        capture.stop();
        tracing::info!("daemon stopped");
        Ok(())
    }
}

/// Builds and runs a dialogue session on the cycle that won arbitration
struct DaemonLauncher {
    agent: Arc<OpenAiAssistant>,
    gateway: Arc<BrewRig>,
    transcriber: Arc<dyn Transcriber>,
    arbiter: Arc<SessionArbiter>,
    clock: TokioClock,
    agent_config: AgentConfig,
    vad: VadConfig,
    speech: SpeechConfig,
    api_key: String,
}

#[async_trait]
impl ConversationLauncher for DaemonLauncher {
    async fn launch(&self, keyword: &str, source: &mut dyn AudioSource) -> Result<()> {
        tracing::info!(keyword, "starting conversation session");

        let tts = TextToSpeech::new(
            SecretString::from(self.api_key.clone()),
            self.speech.tts_model.clone(),
            self.speech.tts_voice.clone(),
            self.speech.tts_speed,
        )?;
        let playback = AudioPlayback::new()?;
        let mut output = VoiceOutput::new(tts, playback);

        let session = DialogueSession::new(
            self.agent.as_ref(),
            self.gateway.as_ref(),
            self.transcriber.as_ref(),
            UtteranceRecorder::new(self.vad),
            &self.clock,
            self.arbiter.as_ref(),
            &self.agent_config,
            &mut output,
            source,
        );

        session.run(&self.agent_config.opening_line).await
    }
}
