//! Keyword spotting
//!
//! One or more concurrent spotting cycles scan short audio windows for the
//! wake keywords. Cycles are staggered so a phrase straddling one cycle's
//! window boundary lands inside another's. Each cycle owns its recognizer —
//! partial-decode state is never shared across cycles.
//!
//! A detection is only ever acted on through [`crate::session::SessionArbiter`]:
//! the cycle that wins arbitration runs the conversation synchronously while
//! the others pause, so the microphone has a single active consumer. Losing
//! arbitration silently drops the detection — a keyword heard twice must not
//! start two sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::SpotterConfig;
use crate::events::{EventBus, SessionEvent};
use crate::session::SessionArbiter;
use crate::{Error, Result};

use super::capture::{AudioFrame, AudioSource, samples_to_wav};
use super::recorder::rms;
use super::stt::Transcriber;

/// Immutable set of lowercase wake keywords, loaded once at startup
#[derive(Debug, Clone)]
pub struct KeywordSet {
    words: Vec<String>,
}

impl KeywordSet {
    /// Build a keyword set, normalizing to lowercase and dropping blanks
    #[must_use]
    pub fn new(words: impl IntoIterator<Item = String>) -> Self {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.to_lowercase().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();

        tracing::debug!(keywords = ?words, "keyword set loaded");
        Self { words }
    }

    /// First keyword contained in the transcript, if any
    ///
    /// Substring match by design: a keyword spoken mid-sentence still
    /// triggers. At most one match is reported per transcript.
    #[must_use]
    pub fn first_match(&self, transcript: &str) -> Option<&str> {
        let normalized = transcript.to_lowercase();
        self.words
            .iter()
            .find(|word| normalized.contains(word.as_str()))
            .map(String::as_str)
    }

    /// The configured keywords
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Whether the set contains no keywords
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Per-cycle speech recognizer
///
/// `&mut self` is deliberate: recognizers accumulate per-cycle decode state
/// and must never be shared between cycles.
#[async_trait]
pub trait Recognizer: Send {
    /// Decode one audio window, returning the finalized transcript if any
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] for unrecoverable audio failures and
    /// [`Error::Stt`] for transient recognition failures.
    async fn recognize(&mut self, frame: &AudioFrame) -> Result<Option<String>>;
}

/// Energy-gated remote recognizer
///
/// Windows below the energy threshold are dropped locally; only windows that
/// plausibly contain speech are sent for transcription.
pub struct WindowRecognizer {
    transcriber: Arc<dyn Transcriber>,
    energy_threshold: f32,
    windows_decoded: u64,
}

impl WindowRecognizer {
    /// Create a recognizer over the given transcription backend
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, energy_threshold: f32) -> Self {
        Self {
            transcriber,
            energy_threshold,
            windows_decoded: 0,
        }
    }
}

#[async_trait]
impl Recognizer for WindowRecognizer {
    async fn recognize(&mut self, frame: &AudioFrame) -> Result<Option<String>> {
        if frame.samples.is_empty() {
            return Ok(None);
        }

        let energy = rms(&frame.samples);
        if energy < self.energy_threshold {
            tracing::trace!(energy, "window below energy gate");
            return Ok(None);
        }

        self.windows_decoded += 1;
        let wav = samples_to_wav(&frame.samples, frame.sample_rate)?;
        let text = self.transcriber.transcribe(&wav).await?;
        let text = text.trim();

        tracing::trace!(window = self.windows_decoded, transcript = text, "window decoded");

        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text.to_string()))
        }
    }
}

/// Runs the conversation once a cycle has won arbitration
///
/// The winning cycle lends its audio source to the session for the whole
/// conversation, keeping the microphone single-consumer.
#[async_trait]
pub trait ConversationLauncher: Send + Sync {
    /// Run one conversation session to completion
    ///
    /// # Errors
    ///
    /// Returns error if the session fails; [`Error::Device`] is fatal to the
    /// calling cycle.
    async fn launch(&self, keyword: &str, source: &mut dyn AudioSource) -> Result<()>;
}

/// Concurrent wake keyword spotter
pub struct KeywordSpotter {
    keywords: Arc<KeywordSet>,
    config: SpotterConfig,
    arbiter: Arc<SessionArbiter>,
    events: EventBus,
}

impl KeywordSpotter {
    /// Create a spotter over the given keyword set
    #[must_use]
    pub fn new(
        keywords: KeywordSet,
        config: SpotterConfig,
        arbiter: Arc<SessionArbiter>,
        events: EventBus,
    ) -> Self {
        Self {
            keywords: Arc::new(keywords),
            config,
            arbiter,
            events,
        }
    }

    /// Run spotting cycles until shutdown, then join them all
    ///
    /// One `(source, recognizer)` pair per cycle. Returns once every cycle
    /// has exited, guaranteeing no capture consumer outlives the call.
    ///
    /// # Errors
    ///
    /// Returns error if a cycle task panics.
    pub async fn run(
        self,
        cycles: Vec<(Box<dyn AudioSource>, Box<dyn Recognizer>)>,
        launcher: Arc<dyn ConversationLauncher>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut handles = Vec::with_capacity(cycles.len());

        for (index, (source, recognizer)) in cycles.into_iter().enumerate() {
            let ctx = CycleContext {
                id: index + 1,
                stagger: self.config.stagger_for(index),
                keywords: Arc::clone(&self.keywords),
                config: self.config.clone(),
                arbiter: Arc::clone(&self.arbiter),
                events: self.events.clone(),
                launcher: Arc::clone(&launcher),
                shutdown: shutdown.clone(),
            };

            handles.push(tokio::spawn(run_cycle(ctx, source, recognizer)));
        }

        tracing::info!(cycles = handles.len(), keywords = ?self.keywords.words(), "keyword spotting started");

        for result in futures::future::join_all(handles).await {
            result.map_err(|e| Error::Device(format!("spotting cycle panicked: {e}")))?;
        }

        tracing::info!("keyword spotting stopped");
        Ok(())
    }
}

struct CycleContext {
    id: usize,
    stagger: Duration,
    keywords: Arc<KeywordSet>,
    config: SpotterConfig,
    arbiter: Arc<SessionArbiter>,
    events: EventBus,
    launcher: Arc<dyn ConversationLauncher>,
    shutdown: watch::Receiver<bool>,
}

/// One spotting cycle: capture a window, decode it, match keywords, and on a
/// match try to win the session
async fn run_cycle(
    ctx: CycleContext,
    mut source: Box<dyn AudioSource>,
    mut recognizer: Box<dyn Recognizer>,
) {
    if !ctx.stagger.is_zero() {
        tokio::time::sleep(ctx.stagger).await;
    }

    tracing::debug!(cycle = ctx.id, "spotting cycle started");

    // Tracks whether audio buffered since our last capture is still fresh;
    // anything buffered across a busy period (including our own session's
    // TTS output) must be discarded, not transcribed.
    let mut fresh = true;

    loop {
        // Shutdown is polled once per iteration, never preemptively
        if *ctx.shutdown.borrow() {
            break;
        }

        // Honor the busy flag before touching the microphone
        if ctx.arbiter.is_busy() {
            fresh = false;
            tokio::time::sleep(ctx.config.backoff).await;
            continue;
        }

        if !fresh {
            source.discard_pending();
            fresh = true;
        }

        let frame = match source.next_chunk(ctx.config.window).await {
            Ok(frame) => frame,
            Err(e @ Error::Device(_)) => {
                tracing::error!(cycle = ctx.id, error = %e, "audio device lost, cycle exiting");
                break;
            }
            Err(e) => {
                tracing::warn!(cycle = ctx.id, error = %e, "capture failed");
                continue;
            }
        };

        let transcript = match recognizer.recognize(&frame).await {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(e @ Error::Device(_)) => {
                tracing::error!(cycle = ctx.id, error = %e, "recognizer lost its device, cycle exiting");
                break;
            }
            Err(e) => {
                tracing::warn!(cycle = ctx.id, error = %e, "recognition failed");
                continue;
            }
        };

        // One acquisition attempt per window, however many keywords matched
        let Some(keyword) = ctx.keywords.first_match(&transcript) else {
            continue;
        };

        if ctx.arbiter.try_acquire() {
            tracing::info!(cycle = ctx.id, keyword, transcript = %transcript, "wake keyword detected");
            ctx.events.publish(SessionEvent::WakeDetected {
                keyword: keyword.to_string(),
            });

            let outcome = ctx.launcher.launch(keyword, source.as_mut()).await;
            // The session releases on a clean quit; this covers error paths
            ctx.arbiter.release();
            fresh = false;

            match outcome {
                Ok(()) => {}
                Err(e @ Error::Device(_)) => {
                    tracing::error!(cycle = ctx.id, error = %e, "session lost the audio device, cycle exiting");
                    break;
                }
                Err(e) => {
                    tracing::error!(cycle = ctx.id, error = %e, "conversation ended with error");
                }
            }
        } else {
            // Expected contention: another cycle or session won the race
            tracing::debug!(cycle = ctx.id, keyword, "detection dropped, session already active");
            tokio::time::sleep(ctx.config.backoff).await;
        }
    }

    tracing::debug!(cycle = ctx.id, "spotting cycle stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_set_normalization() {
        let set = KeywordSet::new(vec![
            "  Brew System  ".to_string(),
            "BRUCE".to_string(),
            "   ".to_string(),
        ]);
        assert_eq!(set.words(), &["brew system", "bruce"]);
    }

    #[test]
    fn test_first_match_is_substring_and_case_insensitive() {
        let set = KeywordSet::new(vec!["brew system".to_string(), "bruce".to_string()]);

        assert_eq!(set.first_match("hey Brew System, wake up"), Some("brew system"));
        assert_eq!(set.first_match("BRUCE are you there"), Some("bruce"));
        assert_eq!(set.first_match("nothing to see"), None);
    }

    #[test]
    fn test_first_match_reports_one_keyword_per_window() {
        let set = KeywordSet::new(vec!["brew system".to_string(), "bruce".to_string()]);

        // Both keywords present; configured order decides, one detection only
        assert_eq!(
            set.first_match("bruce talking to the brew system"),
            Some("brew system")
        );
    }

    #[test]
    fn test_mid_utterance_keyword_triggers() {
        let set = KeywordSet::new(vec!["bruce".to_string()]);
        // Wake-word behavior: a keyword inside a longer sentence counts
        assert_eq!(set.first_match("i told bruce about the mash"), Some("bruce"));
    }

    #[test]
    fn test_empty_keyword_set() {
        let set = KeywordSet::new(Vec::new());
        assert!(set.is_empty());
        assert_eq!(set.first_match("anything"), None);
    }
}
