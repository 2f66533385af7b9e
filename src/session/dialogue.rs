//! Dialogue session state machine
//!
//! Owns the conversation history and drives one conversation with the remote
//! assistant: submit the history, poll the run, dispatch tool calls, speak
//! the reply, record the next turn, repeat until an exit condition. The
//! session runs entirely on the spotting cycle that won arbitration, so the
//! history needs no lock of its own.

use crate::agent::{AssistantClient, RunState, ToolCall, ToolOutput};
use crate::config::AgentConfig;
use crate::tools::{ActuationGateway, END_CONVERSATION};
use crate::voice::{AudioSource, SpeechOutput, Transcriber, Utterance, UtteranceRecorder};
use crate::{Error, Result};

use super::clock::Clock;
use super::{SessionArbiter, SessionState};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The human speaking to the rig
    User,
    /// The remote assistant
    Assistant,
}

impl Role {
    /// Wire representation of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of the conversation history
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    /// Turn author
    pub role: Role,
    /// Turn text
    pub text: String,
}

impl ConversationTurn {
    /// A user-authored turn
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// An assistant-authored turn
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// True if the transcript asks to end the conversation
///
/// Case-insensitive substring match, so "please stop now" matches "stop".
#[must_use]
pub fn matches_exit_intent(transcript: &str, exit_phrases: &[String]) -> bool {
    let normalized = transcript.to_lowercase();
    exit_phrases
        .iter()
        .any(|phrase| !phrase.is_empty() && normalized.contains(phrase.to_lowercase().as_str()))
}

/// One voice conversation with the remote assistant
///
/// Created by the spotting cycle that acquired the [`SessionArbiter`];
/// destroyed — history included — when the session ends.
pub struct DialogueSession<'a> {
    agent: &'a dyn AssistantClient,
    gateway: &'a dyn ActuationGateway,
    transcriber: &'a dyn Transcriber,
    recorder: UtteranceRecorder,
    clock: &'a dyn Clock,
    arbiter: &'a SessionArbiter,
    config: &'a AgentConfig,
    output: &'a mut dyn SpeechOutput,
    source: &'a mut dyn AudioSource,
    history: Vec<ConversationTurn>,
    end_requested: bool,
}

impl<'a> DialogueSession<'a> {
    /// Assemble a session from its collaborators
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        agent: &'a dyn AssistantClient,
        gateway: &'a dyn ActuationGateway,
        transcriber: &'a dyn Transcriber,
        recorder: UtteranceRecorder,
        clock: &'a dyn Clock,
        arbiter: &'a SessionArbiter,
        config: &'a AgentConfig,
        output: &'a mut dyn SpeechOutput,
        source: &'a mut dyn AudioSource,
    ) -> Self {
        Self {
            agent,
            gateway,
            transcriber,
            recorder,
            clock,
            arbiter,
            config,
            output,
            source,
            history: Vec::new(),
            end_requested: false,
        }
    }

    /// Run the conversation to completion
    ///
    /// The arbiter must already be held by the caller. It is released before
    /// this returns, on every path.
    ///
    /// # Errors
    ///
    /// Returns error on failed agent runs and device loss; the farewell or
    /// apology has already been spoken and the arbiter released.
    pub async fn run(mut self, initial_utterance: &str) -> Result<()> {
        let farewell = self.config.farewell_line.clone();
        let apology = self.config.apology_line.clone();

        tracing::info!(text = initial_utterance, "conversation started");
        let mut next_turn = initial_utterance.to_string();

        loop {
            self.history.push(ConversationTurn::user(next_turn));

            self.arbiter.transition(SessionState::Thinking);
            let reply = match self.run_agent_turn().await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(error = %e, "agent run failed");
                    self.quit(&apology).await;
                    return Err(e);
                }
            };

            tracing::info!(reply = %reply, "assistant replied");
            self.history.push(ConversationTurn::assistant(reply.clone()));

            self.arbiter.transition(SessionState::Responding);
            if let Err(e) = self.output.speak(&reply).await {
                // A lost reply is not worth tearing the conversation down
                tracing::warn!(error = %e, "failed to speak reply");
            }

            if self.end_requested {
                tracing::debug!("assistant requested end of conversation");
                self.quit(&farewell).await;
                return Ok(());
            }

            self.arbiter.transition(SessionState::Listening);

            self.arbiter.transition(SessionState::Recording);
            let utterance = match self.recorder.record(&mut *self.source).await {
                Ok(utterance) => utterance,
                Err(e) => {
                    tracing::error!(error = %e, "recording failed");
                    self.quit(&farewell).await;
                    return Err(e);
                }
            };

            if !utterance.speech_detected {
                tracing::debug!("no speech within the wait window, ending session");
                self.quit(&farewell).await;
                return Ok(());
            }

            self.arbiter.transition(SessionState::Transcribing);
            let text = self.transcribe(&utterance).await;
            let text = text.trim().to_string();
            drop(utterance);

            if text.is_empty() {
                tracing::debug!("empty transcript, ending session");
                self.quit(&farewell).await;
                return Ok(());
            }

            tracing::info!(text = %text, "user said");

            if matches_exit_intent(&text, &self.config.exit_phrases) {
                tracing::debug!("exit intent detected");
                self.quit(&farewell).await;
                return Ok(());
            }

            next_turn = text;
        }
    }

    /// Submit the history as a run and poll it to completion
    ///
    /// Tool calls are dispatched and answered as the run requires. The run
    /// is bounded by the configured deadline; exceeding it counts as a
    /// failed run.
    async fn run_agent_turn(&mut self) -> Result<String> {
        let run = self.agent.start_run(&self.history).await?;
        let deadline = self.clock.now() + self.config.run_deadline;

        loop {
            if self.clock.now() >= deadline {
                return Err(Error::Agent(format!(
                    "run exceeded deadline of {}s",
                    self.config.run_deadline.as_secs()
                )));
            }

            match self.agent.poll_run(&run).await? {
                RunState::Completed => return self.agent.fetch_reply(&run).await,
                RunState::Failed { error } => return Err(Error::Agent(error)),
                RunState::RequiresAction { calls } => {
                    let outputs = self.dispatch_tool_calls(calls);
                    self.agent.submit_tool_outputs(&run, outputs).await?;
                }
                RunState::Pending => {
                    self.clock.sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Execute pending tool calls, answering each exactly once
    ///
    /// Dispatch failures become textual results so the assistant can react
    /// in natural language instead of the session crashing.
    fn dispatch_tool_calls(&mut self, calls: Vec<ToolCall>) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());

        for call in calls {
            if call.name == END_CONVERSATION {
                self.end_requested = true;
            }

            let output = match self.gateway.dispatch(&call.name, &call.arguments) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool dispatch failed");
                    format!("Error executing {}: {e}", call.name)
                }
            };

            tracing::debug!(tool = %call.name, call_id = %call.call_id, output = %output, "tool dispatched");
            outputs.push(ToolOutput {
                call_id: call.call_id,
                output,
            });
        }

        outputs
    }

    /// Transcribe an utterance, degrading failures to "no speech"
    async fn transcribe(&self, utterance: &Utterance) -> String {
        let wav = match utterance.to_wav() {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode utterance");
                return String::new();
            }
        };

        match self.transcriber.transcribe(&wav).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed, treating as no speech");
                String::new()
            }
        }
    }

    /// Speak a final line, then release the arbiter
    ///
    /// The user never has a session silently vanish: every teardown path
    /// goes through here.
    async fn quit(&mut self, line: &str) {
        self.arbiter.transition(SessionState::Quitting);

        if let Err(e) = self.output.speak(line).await {
            tracing::warn!(error = %e, "failed to speak farewell");
        }

        self.arbiter.release();
        tracing::info!(turns = self.history.len(), "conversation ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> Vec<String> {
        vec![
            "exit".to_string(),
            "quit".to_string(),
            "stop".to_string(),
            "end conversation".to_string(),
        ]
    }

    #[test]
    fn test_exit_intent_substring_match() {
        assert!(matches_exit_intent("please stop now", &phrases()));
        assert!(matches_exit_intent("EXIT", &phrases()));
        assert!(matches_exit_intent("can we end conversation here", &phrases()));
        assert!(!matches_exit_intent("set the boil kettle to ninety", &phrases()));
    }

    #[test]
    fn test_exit_intent_empty_phrase_never_matches() {
        assert!(!matches_exit_intent("anything", &[String::new()]));
    }

    #[test]
    fn test_turn_constructors() {
        let turn = ConversationTurn::user("hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.role.as_str(), "user");

        let turn = ConversationTurn::assistant("hi");
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.role.as_str(), "assistant");
    }
}
