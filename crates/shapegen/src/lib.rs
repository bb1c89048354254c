//! LLM-assisted SHACL shape generation.
//!
//! `shapegen` turns a free-text *use case* into a SHACL constraint document
//! in three phases, each backed by one call to a text-completion model on
//! the [OpenRouter](https://openrouter.ai/) chat completions API:
//!
//! 1. **Entity extraction**: map the nouns of the use case to schema.org
//!    classes ([`EntityRecord`](records::EntityRecord)).
//! 2. **Property extraction**: list the schema.org properties relevant to
//!    each entity ([`PropertyRecord`](records::PropertyRecord)).
//! 3. **Document generation**: emit a Turtle SHACL document and check it
//!    with a [`ValidationOracle`](oracle::ValidationOracle).
//!
//! Between phases the user may give feedback, which re-runs the current
//! phase with the note folded into the prompt.
//!
//! # Where to find things
//!
//! - **The state machine:** [`PhaseController`](pipeline::PhaseController)
//!   is a pure, synchronous controller. Transitions that need the model
//!   return a [`PhaseRequest`](pipeline::PhaseRequest); the caller runs the
//!   oracle and hands the outcome back with
//!   [`resolve`](pipeline::PhaseController::resolve).
//!
//! - **Running it:** [`Session`](session::Session) owns one controller plus
//!   the two oracles, runs completion calls on a tokio task with a timeout,
//!   and discards results that arrive after the session was closed.
//!
//! - **Prompts:** [`prompt::build`] renders the phase prompts.
//!
//! - **Parsing model output:** [`records`] holds the strict line grammar
//!   (`Name|Description`, `Entity|property|description|Range`).
//!
//! - **Documents:** [`shapes`] extracts and normalizes Turtle from model
//!   output and renders a deterministic skeleton; [`validate`] checks a
//!   document with `rio_turtle` plus SHACL structure rules.
//!
//! - **Front-ends:** [`ui::UiState`] is the display model shared with the
//!   terminal UI; [`events::EventHandler`] observes every transition.
//!
//! # Example
//!
//! ```ignore
//! use shapegen::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = GeneratorConfig::default();
//!     let oracle = OpenRouterOracle::from_env(&config)?;
//!     let mut session = Session::new(oracle, ShaclSyntaxValidator, &config);
//!
//!     session.dispatch_and_wait(Intent::SetInput("A Car has an owner.".into())).await?;
//!     session.dispatch_and_wait(Intent::Advance).await?; // entities
//!     session.dispatch_and_wait(Intent::Advance).await?; // properties
//!     session.dispatch_and_wait(Intent::Advance).await?; // document
//!     println!("{}", session.controller().document().unwrap().document);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod oracle;
pub mod pipeline;
pub mod prelude;
pub mod prompt;
pub mod records;
pub mod session;
pub mod shapes;
pub mod ui;
pub mod validate;

pub use error::PipelineError;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

/// Base URL of the OpenRouter API. Requests go to `{base}/chat/completions`.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model for all pipeline phases.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Default per-call timeout for completion requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a client against the public OpenRouter endpoint.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        Self::with_base_url(api_key, OPENROUTER_BASE_URL, timeout)
    }

    /// Create a client against a custom base URL (proxies, test servers).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("shapegen/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            referer: "https://github.com/tacryt-socryp/shapegen".to_string(),
            title: "shapegen".to_string(),
        })
    }

    /// Endpoint for chat completions.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Send a chat completion request.
    ///
    /// Non-2xx responses become [`PipelineError::Provider`] with the HTTP
    /// status in the cause (`"HTTP 429: ..."`), which is what
    /// [`api::retry::is_transient_error`] keys on.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, PipelineError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::provider(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PipelineError::provider(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(PipelineError::provider(format!(
                "HTTP {}: {text}",
                status.as_u16()
            )));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| PipelineError::provider(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(PipelineError::provider(format!(
                "OpenRouter API error: {}",
                err.message
            )));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        Ok(match choice {
            Some(c) => ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            },
            None => {
                debug!("LLM output: empty (no choices)");
                ChatCompletion {
                    content: None,
                    usage: parsed.usage,
                    finish_reason: None,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.role.to_string(), "user");
    }

    #[test]
    fn chat_request_skips_unset_max_tokens() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.7,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client =
            OpenRouterClient::with_base_url("k", "http://localhost:1234/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1234/chat/completions");
    }
}
