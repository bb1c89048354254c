//! Configuration for a generation session.
//!
//! [`GeneratorConfig`] carries everything the completion oracle and the
//! session driver need: model settings, the per-call timeout, transport
//! retries, and the document-phase fallback switch. Every field has a
//! default, so a JSON config file only needs the keys it overrides:
//!
//! ```json
//! { "model": "anthropic/claude-sonnet-4", "temperature": 0.3, "retry": { "max_retries": 4 } }
//! ```
//!
//! Command-line flags are applied on top with the `with_*` builders.

use std::path::Path;

use serde::Deserialize;

use crate::api::retry::RetryConfig;
use crate::{DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, OPENROUTER_BASE_URL, PipelineError};

/// System prompt sent with every completion call.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an assistant responding to queries about Schema.org concepts.";

/// Settings for one generation session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Model identifier (e.g. `"openai/gpt-4o"`).
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Per-call timeout in seconds; an expired call fails with `Timeout`.
    pub timeout_secs: u64,
    /// OpenRouter-compatible API base URL.
    pub base_url: String,
    /// System prompt shared by all phases.
    pub system_prompt: String,
    /// Retry behavior for transient provider failures.
    pub retry: RetryConfig,
    /// Replace a malformed generated document with the deterministic
    /// skeleton built from the current records.
    pub fallback_skeleton: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: OPENROUTER_BASE_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            retry: RetryConfig::default(),
            fallback_skeleton: false,
        }
    }
}

impl GeneratorConfig {
    /// Parse a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| PipelineError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Reject values no provider would accept.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.model.trim().is_empty() {
            return Err(PipelineError::Config("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PipelineError::Config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.timeout_secs == 0 {
            return Err(PipelineError::Config("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the number of transport retries, keeping the backoff settings.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    pub fn with_fallback_skeleton(mut self, enabled: bool) -> Self {
        self.fallback_skeleton = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.model, "openai/gpt-4o");
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_tokens, 1500);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.retry.max_retries, 2);
        assert!(!config.fallback_skeleton);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GeneratorConfig::from_json(
            r#"{"model": "anthropic/claude-sonnet-4", "retry": {"max_retries": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.model, "anthropic/claude-sonnet-4");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.max_tokens, 1500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = GeneratorConfig::from_json(r#"{"modle": "x"}"#).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(GeneratorConfig::from_json(r#"{"temperature": 3.5}"#).is_err());
        assert!(GeneratorConfig::from_json(r#"{"timeout_secs": 0}"#).is_err());
        assert!(GeneratorConfig::from_json(r#"{"model": " "}"#).is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_tokens": 800, "fallback_skeleton": true}}"#).unwrap();
        let config = GeneratorConfig::load(file.path()).unwrap();
        assert_eq!(config.max_tokens, 800);
        assert!(config.fallback_skeleton);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = GeneratorConfig::load(Path::new("/nonexistent/shapegen.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn builders_override() {
        let config = GeneratorConfig::default()
            .with_model("m")
            .with_temperature(0.1)
            .with_max_tokens(10)
            .with_timeout_secs(5)
            .with_base_url("http://localhost")
            .with_retries(0)
            .with_fallback_skeleton(true);
        assert_eq!(config.model, "m");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.base_url, "http://localhost");
        assert!(config.fallback_skeleton);
    }
}
