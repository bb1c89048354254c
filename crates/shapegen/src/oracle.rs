//! The two external collaborators the pipeline consumes.
//!
//! - [`CompletionOracle`]: prompt in, completion text out. Potentially slow;
//!   the [`Session`](crate::session::Session) always calls it off the
//!   presentation thread.
//! - [`ValidationOracle`]: document in, conformance report out.
//!
//! [`OpenRouterOracle`] is the production completion oracle. The
//! [`ShaclSyntaxValidator`](crate::validate::ShaclSyntaxValidator) is the
//! production validator. [`ScriptedOracle`] replays canned answers for
//! tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use crate::api::retry::{RetryConfig, with_retries};
use crate::api::tracing::{CostTracker, ModelPricing, pricing_for_model};
use crate::config::GeneratorConfig;
use crate::{ChatRequest, Message, OpenRouterClient, PipelineError, UsageInfo};

/// Text returned by a completion call, plus usage when the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<UsageInfo>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Boxed future returned by [`CompletionOracle::complete`].
pub type CompletionFuture<'a> = BoxFuture<'a, Result<Completion, PipelineError>>;

/// A text-completion service: prompt in, completion out.
///
/// Failures are reported as [`PipelineError::Provider`].
pub trait CompletionOracle: Send + Sync {
    /// Complete a single prompt.
    fn complete(&self, prompt: &str) -> CompletionFuture<'_>;

    /// Model identifier shown to the user.
    fn model(&self) -> &str {
        "unknown"
    }
}

impl<T: CompletionOracle + ?Sized> CompletionOracle for Arc<T> {
    fn complete(&self, prompt: &str) -> CompletionFuture<'_> {
        (**self).complete(prompt)
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Result of checking a constraint document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// `true` when no diagnostics were produced.
    pub conforms: bool,
    /// Problems found, in discovery order.
    pub diagnostics: Vec<String>,
    /// Number of `sh:NodeShape` declarations.
    pub node_shapes: usize,
    /// Number of property shapes (objects of `sh:property` or typed `sh:PropertyShape`).
    pub property_shapes: usize,
}

/// A document checker.
///
/// Returns a report for any parseable document, conforming or not. Fails
/// with [`PipelineError::MalformedDocument`] only when the text cannot be
/// parsed at all.
pub trait ValidationOracle: Send + Sync {
    fn validate(&self, document: &str) -> Result<ValidationReport, PipelineError>;
}

impl<T: ValidationOracle + ?Sized> ValidationOracle for Arc<T> {
    fn validate(&self, document: &str) -> Result<ValidationReport, PipelineError> {
        (**self).validate(document)
    }
}

// ── OpenRouter ─────────────────────────────────────────────────────

/// Completion oracle backed by the OpenRouter chat completions API.
///
/// Stateless: every call sends the system prompt and one user prompt.
/// Transient failures are retried per [`RetryConfig`]; token usage is
/// accumulated in a shared [`CostTracker`].
pub struct OpenRouterOracle {
    client: OpenRouterClient,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryConfig,
    pricing: ModelPricing,
    costs: Arc<Mutex<CostTracker>>,
}

impl OpenRouterOracle {
    /// Build an oracle from a client and the generator config.
    pub fn new(client: OpenRouterClient, config: &GeneratorConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: config.retry.clone(),
            pricing: pricing_for_model(&config.model),
            costs: Arc::new(Mutex::new(CostTracker::new())),
        }
    }

    /// Build an oracle reading the API key from `OPENROUTER_KEY`.
    pub fn from_env(config: &GeneratorConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var("OPENROUTER_KEY").map_err(|_| {
            PipelineError::Config("OPENROUTER_KEY environment variable is not set".into())
        })?;
        let client = OpenRouterClient::with_base_url(
            api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self::new(client, config))
    }

    /// Shared handle to the cumulative cost tracker.
    pub fn costs(&self) -> Arc<Mutex<CostTracker>> {
        self.costs.clone()
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::system(&self.system_prompt), Message::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

impl CompletionOracle for OpenRouterOracle {
    fn complete(&self, prompt: &str) -> CompletionFuture<'_> {
        let body = self.request(prompt);
        Box::pin(async move {
            let body = &body;
            let completion = with_retries(&self.retry, |attempt| {
                if attempt > 0 {
                    debug!("Completion retry attempt {attempt}");
                }
                self.client.chat(body)
            })
            .await?;

            if let Some(ref usage) = completion.usage
                && let Ok(mut costs) = self.costs.lock()
            {
                costs.record(usage, &self.pricing);
            }

            match completion.content {
                Some(text) if !text.trim().is_empty() => Ok(Completion {
                    text,
                    usage: completion.usage,
                }),
                _ => Err(PipelineError::provider(format!(
                    "empty completion (finish_reason={})",
                    completion.finish_reason.as_deref().unwrap_or("none")
                ))),
            }
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ── Scripted ───────────────────────────────────────────────────────

/// Completion oracle that replays queued answers in order.
///
/// Each call pops the next answer; an exhausted queue yields a provider
/// error. An optional delay simulates a slow model. Prompts are recorded
/// for inspection.
#[derive(Clone, Default)]
pub struct ScriptedOracle {
    answers: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful answer.
    pub fn answer(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queue a provider failure.
    pub fn fail(self, cause: impl Into<String>) -> Self {
        self.push(Err(cause.into()));
        self
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue another answer on an existing (possibly shared) oracle.
    pub fn push(&self, answer: Result<String, String>) {
        if let Ok(mut q) = self.answers.lock() {
            q.push_back(answer);
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl CompletionOracle for ScriptedOracle {
    fn complete(&self, prompt: &str) -> CompletionFuture<'_> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        let next = self.answers.lock().ok().and_then(|mut q| q.pop_front());
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match next {
                Some(Ok(text)) => Ok(Completion::text(text)),
                Some(Err(cause)) => Err(PipelineError::provider(cause)),
                None => Err(PipelineError::provider("scripted oracle has no answers left")),
            }
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_oracle_replays_in_order() {
        let oracle = ScriptedOracle::new().answer("one").fail("HTTP 503: down");
        assert_eq!(oracle.complete("p1").await.unwrap().text, "one");
        assert!(matches!(
            oracle.complete("p2").await,
            Err(PipelineError::Provider { .. })
        ));
        assert!(oracle.complete("p3").await.is_err());
        assert_eq!(oracle.prompts(), ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn arc_oracle_delegates() {
        let oracle = Arc::new(ScriptedOracle::new().answer("shared"));
        assert_eq!(oracle.model(), "scripted");
        assert_eq!(oracle.complete("p").await.unwrap().text, "shared");
    }

    #[test]
    fn openrouter_request_carries_config() {
        let config = GeneratorConfig {
            model: "openai/gpt-4o-mini".into(),
            temperature: 0.2,
            max_tokens: 900,
            ..Default::default()
        };
        let client = OpenRouterClient::new("key", Duration::from_secs(5)).unwrap();
        let oracle = OpenRouterOracle::new(client, &config);
        let req = oracle.request("List entities");
        assert_eq!(req.model, "openai/gpt-4o-mini");
        assert_eq!(req.max_tokens, 900);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].content, config.system_prompt);
        assert_eq!(req.messages[1].content, "List entities");
        assert_eq!(oracle.model(), "openai/gpt-4o-mini");
    }
}
