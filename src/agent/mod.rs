//! Remote assistant interface
//!
//! One conversation turn with the remote agent is a *run*: the full
//! conversation history is submitted, then the run is polled until it
//! completes, fails, or asks for local tool execution. The [`AssistantClient`]
//! trait is the seam the dialogue session drives; [`OpenAiAssistant`] is the
//! hosted implementation.

mod openai;

pub use openai::OpenAiAssistant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::Result;
use crate::session::ConversationTurn;

/// Handle to a run in flight on the remote agent
#[derive(Debug, Clone)]
pub struct RunHandle {
    /// Remote conversation thread id
    pub thread_id: String,
    /// Run id within the thread
    pub run_id: String,
}

/// Observed state of a remote run
#[derive(Debug, Clone)]
pub enum RunState {
    /// Still queued or in progress; poll again
    Pending,
    /// Run finished; the reply can be fetched
    Completed,
    /// Run failed remotely
    Failed {
        /// Remote error description
        error: String,
    },
    /// The agent needs local tool results before it can continue
    RequiresAction {
        /// Pending tool calls, each answered exactly once
        calls: Vec<ToolCall>,
    },
}

/// A tool invocation requested by the remote agent
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Id to echo back with the output
    pub call_id: String,
    /// Tool name (see [`crate::tools`])
    pub name: String,
    /// Parsed JSON arguments
    pub arguments: Map<String, Value>,
}

/// Result of one tool call, paired 1:1 with a [`ToolCall`]
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Id of the answered call
    pub call_id: String,
    /// Human-readable result text for the agent
    pub output: String,
}

/// Client for the remote conversational agent
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Submit the conversation history and start a run
    async fn start_run(&self, history: &[ConversationTurn]) -> Result<RunHandle>;

    /// Query the current state of a run
    async fn poll_run(&self, run: &RunHandle) -> Result<RunState>;

    /// Submit tool outputs so a `RequiresAction` run can continue
    async fn submit_tool_outputs(&self, run: &RunHandle, outputs: Vec<ToolOutput>) -> Result<()>;

    /// Fetch the assistant's reply text from a completed run
    async fn fetch_reply(&self, run: &RunHandle) -> Result<String>;
}
