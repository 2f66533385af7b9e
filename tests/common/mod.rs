//! Shared test doubles for the voice pipeline
//!
//! Everything here is deterministic and hardware-free: scripted audio,
//! scripted assistant runs, a virtual clock, and recording collaborators
//! that remember what the pipeline did to them.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use brewvoice::agent::{AssistantClient, RunHandle, RunState, ToolOutput};
use brewvoice::session::Clock;
use brewvoice::tools::ActuationGateway;
use brewvoice::voice::{
    AudioFrame, AudioSource, Recognizer, SpeechOutput, Transcriber,
};
use brewvoice::{ConversationTurn, Error, Result};

/// Test sample rate
pub const TEST_RATE: u32 = 16_000;

/// Generate sine wave audio samples
pub fn sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (TEST_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / TEST_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
pub fn silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (TEST_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Audio source replaying a fixed sample buffer, then endless silence
///
/// Chunks are served instantly — no real time passes in tests.
pub struct ScriptedSource {
    samples: VecDeque<f32>,
    chunks_served: usize,
}

impl ScriptedSource {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
            chunks_served: 0,
        }
    }

    /// Number of chunks handed out so far
    pub fn chunks_served(&self) -> usize {
        self.chunks_served
    }
}

#[async_trait]
impl AudioSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        TEST_RATE
    }

    async fn next_chunk(&mut self, duration: Duration) -> Result<AudioFrame> {
        // Keep the scheduler fair: a live source would block here
        tokio::task::yield_now().await;

        let wanted = (duration.as_secs_f64() * f64::from(TEST_RATE)) as usize;
        let mut samples = Vec::with_capacity(wanted);

        for _ in 0..wanted {
            samples.push(self.samples.pop_front().unwrap_or(0.0));
        }

        self.chunks_served += 1;
        Ok(AudioFrame {
            samples,
            sample_rate: TEST_RATE,
            captured_at: chrono::Utc::now(),
        })
    }
}

/// Audio source that fails like a missing microphone
pub struct DeadSource;

#[async_trait]
impl AudioSource for DeadSource {
    fn sample_rate(&self) -> u32 {
        TEST_RATE
    }

    async fn next_chunk(&mut self, _duration: Duration) -> Result<AudioFrame> {
        Err(Error::Device("no input device available".to_string()))
    }
}

/// Recognizer yielding a scripted sequence of window transcripts
///
/// Once the script is exhausted it reports a dead device so spotting cycles
/// wind down instead of spinning forever.
pub struct ScriptedRecognizer {
    outputs: VecDeque<Option<String>>,
}

impl ScriptedRecognizer {
    pub fn new(outputs: Vec<Option<&str>>) -> Self {
        Self {
            outputs: outputs
                .into_iter()
                .map(|o| o.map(ToString::to_string))
                .collect(),
        }
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&mut self, _frame: &AudioFrame) -> Result<Option<String>> {
        self.outputs
            .pop_front()
            .ok_or_else(|| Error::Device("recognizer script exhausted".to_string()))
    }
}

/// Transcriber returning scripted texts, then empty strings
pub struct ScriptedTranscriber {
    texts: Mutex<VecDeque<Result<String>>>,
    pub calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(texts: Vec<&str>) -> Self {
        Self {
            texts: Mutex::new(texts.into_iter().map(|t| Ok(t.to_string())).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A transcriber whose next call fails with an STT error
    pub fn failing() -> Self {
        let mut texts: VecDeque<Result<String>> = VecDeque::new();
        texts.push_back(Err(Error::Stt("service unavailable".to_string())));
        Self {
            texts: Mutex::new(texts),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _wav: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Speech output that records what was spoken instead of playing it
#[derive(Default)]
pub struct NullSpeaker {
    pub spoken: Vec<String>,
}

#[async_trait]
impl SpeechOutput for NullSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.push(text.to_string());
        Ok(())
    }
}

/// One scripted step of an assistant run
pub enum AgentStep {
    Pending,
    Completed,
    Failed(&'static str),
    RequiresAction(Vec<brewvoice::agent::ToolCall>),
}

/// Assistant whose runs follow a script of poll results
///
/// Every `start_run` consumes the next script; submissions and submitted
/// tool outputs are recorded for assertions.
pub struct ScriptedAssistant {
    scripts: Mutex<VecDeque<Vec<AgentStep>>>,
    current: Mutex<VecDeque<AgentStep>>,
    reply: String,
    pub runs_started: AtomicUsize,
    pub polls: AtomicUsize,
    pub histories: Mutex<Vec<Vec<ConversationTurn>>>,
    pub submitted_outputs: Mutex<Vec<Vec<ToolOutput>>>,
}

impl ScriptedAssistant {
    pub fn new(reply: &str, scripts: Vec<Vec<AgentStep>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            current: Mutex::new(VecDeque::new()),
            reply: reply.to_string(),
            runs_started: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
            submitted_outputs: Mutex::new(Vec::new()),
        }
    }

    /// An assistant that completes every run immediately with `reply`
    pub fn always_completing(reply: &str) -> Self {
        let scripts = (0..16).map(|_| vec![AgentStep::Completed]).collect();
        Self::new(reply, scripts)
    }
}

#[async_trait]
impl AssistantClient for ScriptedAssistant {
    async fn start_run(&self, history: &[ConversationTurn]) -> Result<RunHandle> {
        let n = self.runs_started.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().unwrap().push(history.to_vec());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![AgentStep::Completed]);
        *self.current.lock().unwrap() = script.into();

        Ok(RunHandle {
            thread_id: format!("thread_{n}"),
            run_id: format!("run_{n}"),
        })
    }

    async fn poll_run(&self, _run: &RunHandle) -> Result<RunState> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let step = self.current.lock().unwrap().pop_front();
        Ok(match step {
            Some(AgentStep::Pending) | None => RunState::Pending,
            Some(AgentStep::Completed) => RunState::Completed,
            Some(AgentStep::Failed(error)) => RunState::Failed {
                error: error.to_string(),
            },
            Some(AgentStep::RequiresAction(calls)) => RunState::RequiresAction { calls },
        })
    }

    async fn submit_tool_outputs(&self, _run: &RunHandle, outputs: Vec<ToolOutput>) -> Result<()> {
        self.submitted_outputs.lock().unwrap().push(outputs);
        Ok(())
    }

    async fn fetch_reply(&self, _run: &RunHandle) -> Result<String> {
        Ok(self.reply.clone())
    }
}

/// Gateway recording every dispatched call
#[derive(Default)]
pub struct RecordingGateway {
    pub calls: Mutex<Vec<(String, serde_json::Map<String, serde_json::Value>)>>,
}

impl ActuationGateway for RecordingGateway {
    fn dispatch(
        &self,
        name: &str,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        self.calls.lock().unwrap().push((name.to_string(), args.clone()));
        Ok(format!("{name} executed"))
    }
}

/// Gateway whose every dispatch fails
pub struct FailingGateway;

impl ActuationGateway for FailingGateway {
    fn dispatch(
        &self,
        _name: &str,
        _args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        Err(Error::Tool("relay board not responding".to_string()))
    }
}

/// Virtual clock: `sleep` advances time instantly
pub struct InstantClock {
    base: Instant,
    offset: Mutex<Duration>,
    pub sleeps: AtomicUsize,
}

impl InstantClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: AtomicUsize::new(0),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for InstantClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        *self.offset.lock().unwrap() += duration;
    }
}

/// Build a one-call `RequiresAction` step
pub fn tool_call_step(
    call_id: &str,
    name: &str,
    args: serde_json::Value,
) -> AgentStep {
    AgentStep::RequiresAction(vec![brewvoice::agent::ToolCall {
        call_id: call_id.to_string(),
        name: name.to_string(),
        arguments: args.as_object().cloned().unwrap_or_default(),
    }])
}
