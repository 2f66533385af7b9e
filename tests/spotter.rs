//! Keyword spotting cycle tests
//!
//! Scripted recognizers drive cycles deterministically: detections must win
//! the arbiter exactly once per matching window, pause while a session is
//! active, stop on shutdown, and hand the microphone to the session they
//! launch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use brewvoice::config::{AgentConfig, SpotterConfig, VadConfig};
use brewvoice::session::DialogueSession;
use brewvoice::voice::{
    AudioFrame, AudioSource, ConversationLauncher, KeywordSet, KeywordSpotter, Recognizer,
    UtteranceRecorder,
};
use brewvoice::{EventBus, Result, SessionArbiter, SessionEvent};

mod common;

use common::{
    InstantClock, NullSpeaker, RecordingGateway, ScriptedAssistant, ScriptedRecognizer,
    ScriptedSource, ScriptedTranscriber,
};

fn spotter_config(cycles: usize) -> SpotterConfig {
    SpotterConfig {
        cycles,
        window: Duration::from_millis(10),
        stagger: Vec::new(),
        backoff: Duration::from_millis(5),
        energy_threshold: 0.0,
    }
}

fn keywords() -> KeywordSet {
    KeywordSet::new(vec!["brew system".to_string(), "bruce".to_string()])
}

/// Launcher that only counts invocations
#[derive(Default)]
struct CountingLauncher {
    launches: AtomicUsize,
    keywords_seen: Mutex<Vec<String>>,
}

#[async_trait]
impl ConversationLauncher for CountingLauncher {
    async fn launch(&self, keyword: &str, _source: &mut dyn AudioSource) -> Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.keywords_seen.lock().unwrap().push(keyword.to_string());
        Ok(())
    }
}

/// Recognizer that never finalizes a transcript
struct IdleRecognizer;

#[async_trait]
impl Recognizer for IdleRecognizer {
    async fn recognize(&mut self, _frame: &AudioFrame) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Recognizer that must never be consulted
struct ForbiddenRecognizer;

#[async_trait]
impl Recognizer for ForbiddenRecognizer {
    async fn recognize(&mut self, _frame: &AudioFrame) -> Result<Option<String>> {
        panic!("recognizer consulted while the session was busy");
    }
}

#[tokio::test]
async fn test_detection_launches_conversation_once() {
    let events = EventBus::new();
    let mut event_rx = events.subscribe();
    let arbiter = Arc::new(SessionArbiter::new(events.clone()));
    let launcher = Arc::new(CountingLauncher::default());
    let (_tx, rx) = watch::channel(false);

    let spotter = KeywordSpotter::new(keywords(), spotter_config(1), Arc::clone(&arbiter), events);

    // One matching window, then the script runs dry and the cycle exits
    let recognizer = ScriptedRecognizer::new(vec![
        None,
        Some("hey brew system turn on the kettle"),
    ]);

    spotter
        .run(
            vec![(
                Box::new(ScriptedSource::new(Vec::new())),
                Box::new(recognizer),
            )],
            Arc::clone(&launcher) as Arc<dyn ConversationLauncher>,
            rx,
        )
        .await
        .unwrap();

    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    assert_eq!(
        launcher.keywords_seen.lock().unwrap().as_slice(),
        &["brew system".to_string()]
    );

    // Arbiter is free again once the conversation returns
    assert!(!arbiter.is_busy());

    // The wake was announced to subscribers
    assert_eq!(
        event_rx.recv().await.unwrap(),
        SessionEvent::State(brewvoice::SessionState::Listening)
    );
    assert_eq!(
        event_rx.recv().await.unwrap(),
        SessionEvent::WakeDetected {
            keyword: "brew system".to_string()
        }
    );
}

#[tokio::test]
async fn test_window_with_two_keywords_triggers_once() {
    let events = EventBus::new();
    let arbiter = Arc::new(SessionArbiter::new(events.clone()));
    let launcher = Arc::new(CountingLauncher::default());
    let (_tx, rx) = watch::channel(false);

    let spotter = KeywordSpotter::new(keywords(), spotter_config(1), Arc::clone(&arbiter), events);

    // Both configured keywords inside one window transcript
    let recognizer = ScriptedRecognizer::new(vec![Some("bruce talking to the brew system")]);

    spotter
        .run(
            vec![(
                Box::new(ScriptedSource::new(Vec::new())),
                Box::new(recognizer),
            )],
            Arc::clone(&launcher) as Arc<dyn ConversationLauncher>,
            rx,
        )
        .await
        .unwrap();

    // First match wins; one window yields at most one detection
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    assert_eq!(
        launcher.keywords_seen.lock().unwrap().as_slice(),
        &["brew system".to_string()]
    );
}

#[tokio::test]
async fn test_non_matching_windows_never_launch() {
    let events = EventBus::new();
    let arbiter = Arc::new(SessionArbiter::new(events.clone()));
    let launcher = Arc::new(CountingLauncher::default());
    let (_tx, rx) = watch::channel(false);

    let spotter = KeywordSpotter::new(keywords(), spotter_config(1), Arc::clone(&arbiter), events);

    let recognizer = ScriptedRecognizer::new(vec![
        Some("the mash smells great"),
        None,
        Some("no wake words here"),
    ]);

    spotter
        .run(
            vec![(
                Box::new(ScriptedSource::new(Vec::new())),
                Box::new(recognizer),
            )],
            Arc::clone(&launcher) as Arc<dyn ConversationLauncher>,
            rx,
        )
        .await
        .unwrap();

    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    assert!(!arbiter.is_busy());
}

#[tokio::test]
async fn test_cycles_pause_while_session_is_busy() {
    let events = EventBus::new();
    let arbiter = Arc::new(SessionArbiter::new(events.clone()));
    let launcher = Arc::new(CountingLauncher::default());
    let (tx, rx) = watch::channel(false);

    // Simulate an active session owned by someone else
    assert!(arbiter.try_acquire());

    let spotter = KeywordSpotter::new(keywords(), spotter_config(1), Arc::clone(&arbiter), events);

    let handle = tokio::spawn(spotter.run(
        vec![(
            Box::new(ScriptedSource::new(Vec::new())) as Box<dyn AudioSource>,
            Box::new(ForbiddenRecognizer) as Box<dyn Recognizer>,
        )],
        Arc::clone(&launcher) as Arc<dyn ConversationLauncher>,
        rx,
    ));

    // Give the cycle time to spin through several busy backoffs
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    handle.await.unwrap().unwrap();

    // The busy flag kept the cycle away from the microphone entirely
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_stops_and_joins_all_cycles() {
    let events = EventBus::new();
    let arbiter = Arc::new(SessionArbiter::new(events.clone()));
    let launcher = Arc::new(CountingLauncher::default());
    let (tx, rx) = watch::channel(false);

    let spotter = KeywordSpotter::new(keywords(), spotter_config(3), Arc::clone(&arbiter), events);

    let cycles: Vec<(Box<dyn AudioSource>, Box<dyn Recognizer>)> = (0..3)
        .map(|_| {
            (
                Box::new(ScriptedSource::new(Vec::new())) as Box<dyn AudioSource>,
                Box::new(IdleRecognizer) as Box<dyn Recognizer>,
            )
        })
        .collect();

    let handle = tokio::spawn(spotter.run(
        cycles,
        Arc::clone(&launcher) as Arc<dyn ConversationLauncher>,
        rx,
    ));

    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(true).unwrap();

    // run() only returns once every cycle has exited
    handle.await.unwrap().unwrap();
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
}

/// Launcher running a real dialogue session over test doubles
struct PipelineLauncher {
    assistant: Arc<ScriptedAssistant>,
    gateway: Arc<RecordingGateway>,
    transcriber: Arc<ScriptedTranscriber>,
    clock: Arc<InstantClock>,
    arbiter: Arc<SessionArbiter>,
    config: AgentConfig,
    spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl ConversationLauncher for PipelineLauncher {
    async fn launch(&self, _keyword: &str, source: &mut dyn AudioSource) -> Result<()> {
        let mut speaker = NullSpeaker::default();

        let session = DialogueSession::new(
            self.assistant.as_ref(),
            self.gateway.as_ref(),
            self.transcriber.as_ref(),
            UtteranceRecorder::new(VadConfig {
                chunk_duration: Duration::from_millis(500),
                speech_threshold: 0.015,
                silence_duration: Duration::from_millis(1500),
                max_wait: Duration::from_secs(6),
            }),
            self.clock.as_ref(),
            self.arbiter.as_ref(),
            &self.config,
            &mut speaker,
            source,
        );

        let result = session.run(&self.config.opening_line).await;
        self.spoken.lock().unwrap().extend(speaker.spoken);
        result
    }
}

#[tokio::test]
async fn test_wake_to_farewell_end_to_end() {
    let events = EventBus::new();
    let arbiter = Arc::new(SessionArbiter::new(events.clone()));
    let config = AgentConfig::default();

    let launcher = Arc::new(PipelineLauncher {
        assistant: Arc::new(ScriptedAssistant::always_completing("Hello")),
        gateway: Arc::new(RecordingGateway::default()),
        transcriber: Arc::new(ScriptedTranscriber::new(vec![])),
        clock: Arc::new(InstantClock::new()),
        arbiter: Arc::clone(&arbiter),
        config: config.clone(),
        spoken: Mutex::new(Vec::new()),
    });

    let spotter = KeywordSpotter::new(
        keywords(),
        spotter_config(1),
        Arc::clone(&arbiter),
        events,
    );

    // Wake phrase detected, then the script runs dry and the cycle exits;
    // the session's microphone hears only silence
    let recognizer = ScriptedRecognizer::new(vec![Some("hey brew system")]);
    let (_tx, rx) = watch::channel(false);

    spotter
        .run(
            vec![(
                Box::new(ScriptedSource::new(Vec::new())),
                Box::new(recognizer),
            )],
            Arc::clone(&launcher) as Arc<dyn ConversationLauncher>,
            rx,
        )
        .await
        .unwrap();

    // Agent replied once, no further speech arrived, session said farewell
    assert_eq!(launcher.assistant.runs_started.load(Ordering::SeqCst), 1);
    assert_eq!(
        launcher.spoken.lock().unwrap().as_slice(),
        &["Hello".to_string(), config.farewell_line.clone()]
    );

    // The system is back to passive spotting with the arbiter released
    assert!(!arbiter.is_busy());
}
