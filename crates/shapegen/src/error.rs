//! Error taxonomy for the pipeline.
//!
//! Every failure the controller can observe is a [`PipelineError`]. None of
//! them end a session: the controller catches them at its boundary, keeps
//! the pre-transition state, and hands the error outward for display.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the pipeline, its oracles, and its front-ends.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport, authentication, or quota failure from the completion service.
    #[error("completion provider failed: {cause}")]
    Provider { cause: String },

    /// The completion call exceeded the configured timeout.
    #[error("completion timed out after {after:?}")]
    Timeout { after: Duration },

    /// The completion text did not match the record grammar.
    #[error("could not parse model output (line {line}): {reason}")]
    Parse { line: usize, reason: String },

    /// The generated document is not parseable Turtle at all.
    #[error("generated document is not valid Turtle: {cause}")]
    MalformedDocument { cause: String },

    /// A phase was asked to build a prompt from an incomplete context.
    #[error("invalid phase context: {0}")]
    InvalidPhaseContext(String),

    /// The requested intent is not allowed from the current state.
    #[error("cannot {intent} while {state}")]
    InvalidTransition {
        intent: &'static str,
        state: &'static str,
    },

    /// A completion call is already in flight.
    #[error("a model call is already in progress")]
    Busy,

    /// The session was closed; no further transitions are possible.
    #[error("session is closed")]
    Terminated,

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying I/O failure (reading input, writing the document).
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Shorthand for a provider failure.
    pub fn provider(cause: impl Into<String>) -> Self {
        Self::Provider {
            cause: cause.into(),
        }
    }

    /// Shorthand for a parse failure at a 1-based line number.
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Whether the user can recover by retrying, giving feedback, or
    /// retreating. `InvalidPhaseContext` is a defect, and `Terminated` is final.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider { .. }
            | Self::Timeout { .. }
            | Self::Parse { .. }
            | Self::MalformedDocument { .. }
            | Self::InvalidTransition { .. }
            | Self::Busy
            | Self::Io(_) => true,
            Self::InvalidPhaseContext(_) | Self::Terminated | Self::Config(_) => false,
        }
    }

    /// Short category label used in logs and the status bar.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider { .. } => "provider",
            Self::Timeout { .. } => "timeout",
            Self::Parse { .. } => "parse",
            Self::MalformedDocument { .. } => "malformed-document",
            Self::InvalidPhaseContext(_) => "invalid-context",
            Self::InvalidTransition { .. } => "invalid-transition",
            Self::Busy => "busy",
            Self::Terminated => "terminated",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            PipelineError::parse(3, "expected 2 fields").to_string(),
            "could not parse model output (line 3): expected 2 fields"
        );
        assert_eq!(
            PipelineError::InvalidTransition {
                intent: "retreat",
                state: "idle"
            }
            .to_string(),
            "cannot retreat while idle"
        );
        assert_eq!(
            PipelineError::Timeout {
                after: Duration::from_millis(500)
            }
            .to_string(),
            "completion timed out after 500ms"
        );
        assert!(
            PipelineError::provider("HTTP 401")
                .to_string()
                .contains("HTTP 401")
        );
    }

    #[test]
    fn recoverability() {
        assert!(PipelineError::provider("boom").is_recoverable());
        assert!(PipelineError::Timeout { after: Duration::from_secs(60) }.is_recoverable());
        assert!(PipelineError::parse(1, "x").is_recoverable());
        assert!(!PipelineError::InvalidPhaseContext("empty".into()).is_recoverable());
        assert!(!PipelineError::Terminated.is_recoverable());
    }

    #[test]
    fn io_errors_convert() {
        let err: PipelineError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "io");
    }
}
