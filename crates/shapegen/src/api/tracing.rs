//! Session IDs and cost tracking for completion calls.
//!
//! Every [`Session`](crate::session::Session) gets a `session_id` used as a
//! tracing field, and a [`CostTracker`] that accumulates token usage and an
//! estimated spend across all phases and retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::UsageInfo;

/// Generate a unique ID for an interactive session.
pub fn generate_session_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sg-{ts:x}-{count:04x}")
}

/// Per-model pricing for cost estimation (USD per 1M tokens).
#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Estimate cost for given token counts.
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_million: 2.50,
            output_per_million: 10.0,
        }
    }
}

/// Lookup approximate pricing for a model by name.
///
/// Matches on the segment after the last `/` so org prefixes like
/// `"my-org/custom-sonnet-finetune"` don't produce false positives.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    // Approximate list prices; good enough to notice a runaway session.
    let (input, output) = if name.contains("gpt-4o-mini") || name.contains("4o-mini") {
        (0.15, 0.60)
    } else if name.contains("gpt-4o") || name.contains("gpt-4") {
        (2.50, 10.0)
    } else if name.contains("opus") {
        (15.0, 75.0)
    } else if name.contains("sonnet") {
        (3.0, 15.0)
    } else if name.contains("haiku") {
        (0.25, 1.25)
    } else if name.contains("gemini") && name.contains("flash") {
        (0.075, 0.30)
    } else if name.contains("gemini") {
        (1.25, 5.0)
    } else if name.contains("deepseek") {
        (0.27, 1.10)
    } else {
        return ModelPricing::default();
    };
    ModelPricing {
        input_per_million: input,
        output_per_million: output,
    }
}

/// Cumulative token and cost tracker for one session.
#[derive(Debug, Default, Clone)]
pub struct CostTracker {
    pub calls: u32,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record token usage reported by one completion call.
    pub fn record(&mut self, usage: &UsageInfo, pricing: &ModelPricing) {
        let prompt = usage.prompt_tokens.unwrap_or(0);
        let completion = usage.completion_tokens.unwrap_or(0);
        self.calls += 1;
        self.total_prompt_tokens += prompt as u64;
        self.total_completion_tokens += completion as u64;
        self.estimated_cost_usd += pricing.estimate_cost(prompt, completion);
    }

    /// Total tokens consumed.
    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        format!(
            "{} call(s), tokens: {} prompt + {} completion = {} total, est. cost: ${:.4}",
            self.calls,
            self.total_prompt_tokens,
            self.total_completion_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}
