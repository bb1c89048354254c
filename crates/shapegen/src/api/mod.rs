//! API interaction layer: retry policy and cost tracking for completion calls.
//!
//! - [`retry`]: transient error detection (429, 5xx, network timeouts) with
//!   configurable exponential backoff. Never retries 400/401 errors.
//! - [`tracing`]: session IDs, per-model pricing tables, and the cumulative
//!   [`CostTracker`] shown in the status bar.

pub mod retry;
pub mod tracing;

pub use retry::{RetryConfig, with_retries};
pub use tracing::{CostTracker, generate_session_id, pricing_for_model};
