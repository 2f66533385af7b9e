//! `OpenAI` Assistants API client
//!
//! Thread-and-run flow: create a thread holding the conversation history,
//! start a run against the configured assistant, poll run status, submit tool
//! outputs when the run requires action, and read the newest assistant
//! message once completed.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::session::ConversationTurn;
use crate::{Error, Result};

use super::{AssistantClient, RunHandle, RunState, ToolCall, ToolOutput};

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Assistants API version header required for thread/run endpoints
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

#[derive(serde::Serialize)]
struct CreateThreadRequest<'a> {
    messages: Vec<ThreadMessage<'a>>,
}

#[derive(serde::Serialize)]
struct ThreadMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ThreadResponse {
    id: String,
}

#[derive(serde::Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(serde::Deserialize)]
struct RunResponse {
    id: String,
    status: String,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<LastError>,
}

#[derive(serde::Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputsAction,
}

#[derive(serde::Deserialize)]
struct SubmitToolOutputsAction {
    tool_calls: Vec<ApiToolCall>,
}

#[derive(serde::Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunctionCall,
}

#[derive(serde::Deserialize)]
struct ApiFunctionCall {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
}

#[derive(serde::Deserialize)]
struct LastError {
    message: String,
}

#[derive(serde::Serialize)]
struct SubmitToolOutputsRequest {
    tool_outputs: Vec<ApiToolOutput>,
}

#[derive(serde::Serialize)]
struct ApiToolOutput {
    tool_call_id: String,
    output: String,
}

#[derive(serde::Deserialize)]
struct MessageListResponse {
    data: Vec<ApiMessage>,
}

#[derive(serde::Deserialize)]
struct ApiMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(serde::Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<TextBlock>,
}

#[derive(serde::Deserialize)]
struct TextBlock {
    value: String,
}

/// Hosted assistant client over the `OpenAI` Assistants REST API
pub struct OpenAiAssistant {
    client: reqwest::Client,
    api_key: SecretString,
    assistant_id: String,
    base_url: String,
}

impl OpenAiAssistant {
    /// Create a new client for the given assistant
    ///
    /// # Errors
    ///
    /// Returns error if the API key or assistant id is empty
    pub fn new(api_key: SecretString, assistant_id: String) -> Result<Self> {
        Self::with_base_url(api_key, assistant_id, DEFAULT_BASE_URL.to_string())
    }

    /// Create a client against a non-default API base URL
    ///
    /// # Errors
    ///
    /// Returns error if the API key or assistant id is empty
    pub fn with_base_url(
        api_key: SecretString,
        assistant_id: String,
        base_url: String,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for the assistant".to_string()));
        }
        if assistant_id.is_empty() {
            return Err(Error::Config("assistant id required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            assistant_id,
            base_url,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    async fn check<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, context, "assistant API error");
            return Err(Error::Agent(format!("{context} failed with {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AssistantClient for OpenAiAssistant {
    async fn start_run(&self, history: &[ConversationTurn]) -> Result<RunHandle> {
        let messages = history
            .iter()
            .map(|turn| ThreadMessage {
                role: turn.role.as_str(),
                content: &turn.text,
            })
            .collect();

        let thread: ThreadResponse = Self::check(
            self.request(reqwest::Method::POST, "/threads")
                .json(&CreateThreadRequest { messages })
                .send()
                .await?,
            "thread creation",
        )
        .await?;

        let run: RunResponse = Self::check(
            self.request(
                reqwest::Method::POST,
                &format!("/threads/{}/runs", thread.id),
            )
            .json(&CreateRunRequest {
                assistant_id: &self.assistant_id,
            })
            .send()
            .await?,
            "run creation",
        )
        .await?;

        tracing::debug!(thread = %thread.id, run = %run.id, status = %run.status, "run started");

        Ok(RunHandle {
            thread_id: thread.id,
            run_id: run.id,
        })
    }

    async fn poll_run(&self, run: &RunHandle) -> Result<RunState> {
        let response: RunResponse = Self::check(
            self.request(
                reqwest::Method::GET,
                &format!("/threads/{}/runs/{}", run.thread_id, run.run_id),
            )
            .send()
            .await?,
            "run poll",
        )
        .await?;

        Ok(parse_run_state(&response))
    }

    async fn submit_tool_outputs(&self, run: &RunHandle, outputs: Vec<ToolOutput>) -> Result<()> {
        let tool_outputs = outputs
            .into_iter()
            .map(|output| ApiToolOutput {
                tool_call_id: output.call_id,
                output: output.output,
            })
            .collect();

        let _: RunResponse = Self::check(
            self.request(
                reqwest::Method::POST,
                &format!(
                    "/threads/{}/runs/{}/submit_tool_outputs",
                    run.thread_id, run.run_id
                ),
            )
            .json(&SubmitToolOutputsRequest { tool_outputs })
            .send()
            .await?,
            "tool output submission",
        )
        .await?;

        Ok(())
    }

    async fn fetch_reply(&self, run: &RunHandle) -> Result<String> {
        let messages: MessageListResponse = Self::check(
            self.request(
                reqwest::Method::GET,
                &format!("/threads/{}/messages", run.thread_id),
            )
            .send()
            .await?,
            "message listing",
        )
        .await?;

        // Newest first; take the first assistant-authored text block
        for message in &messages.data {
            if message.role != "assistant" {
                continue;
            }
            for block in &message.content {
                if block.block_type == "text" {
                    if let Some(text) = &block.text {
                        return Ok(text.value.clone());
                    }
                }
            }
        }

        Err(Error::Agent("no assistant reply in thread".to_string()))
    }
}

/// Map an API run response to the local run state
fn parse_run_state(response: &RunResponse) -> RunState {
    match response.status.as_str() {
        "completed" => RunState::Completed,
        "failed" | "cancelled" | "expired" => RunState::Failed {
            error: response
                .last_error
                .as_ref()
                .map_or_else(|| response.status.clone(), |e| e.message.clone()),
        },
        "requires_action" => {
            let calls = response
                .required_action
                .as_ref()
                .map(|action| {
                    action
                        .submit_tool_outputs
                        .tool_calls
                        .iter()
                        .map(|call| ToolCall {
                            call_id: call.id.clone(),
                            name: call.function.name.clone(),
                            arguments: parse_arguments(&call.function.arguments),
                        })
                        .collect()
                })
                .unwrap_or_default();

            RunState::RequiresAction { calls }
        }
        _ => RunState::Pending,
    }
}

/// Parse the JSON-encoded argument string of a tool call
///
/// A malformed argument payload degrades to an empty map — the gateway will
/// report missing arguments back to the agent in text, which keeps the
/// session alive instead of aborting the turn.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(?other, "tool arguments were not an object");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, raw, "failed to parse tool arguments");
            Map::new()
        }
    }
}
