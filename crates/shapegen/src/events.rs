//! Events emitted by a [`Session`](crate::session::Session).
//!
//! Every controller transition is reported as a [`PipelineEvent`]. Front-ends
//! implement [`EventHandler`] to mirror the session into their display
//! state; [`LoggingHandler`] writes the same stream to `tracing`.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests |
//! | [`LoggingHandler`] | Headless runs |
//! | [`FnEventHandler`] | Quick closures |
//! | [`CompositeEventHandler`] | Several handlers in order |
//! | [`UiEventHandler`](crate::ui::event_handler::UiEventHandler) | Terminal UI state |

use tracing::{debug, error, info, warn};

use crate::PipelineError;
use crate::pipeline::{PipelinePhase, PipelineState};

/// Something that happened in a session.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    /// An intent was refused; the state did not change.
    IntentRejected {
        intent: &'static str,
        error: &'a PipelineError,
    },
    /// A completion call was issued.
    PhaseStarted {
        phase: PipelinePhase,
        ticket: u64,
        with_feedback: bool,
    },
    /// Raw text returned by the completion oracle, before parsing.
    Completion { phase: PipelinePhase, text: &'a str },
    /// Token usage reported for one completion.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// A phase failed; the controller rolled back.
    PhaseFailed {
        phase: PipelinePhase,
        error: &'a PipelineError,
    },
    /// The controller settled in a new state.
    StateChanged {
        state: PipelineState,
        /// Current phase output, when the state shows one.
        output: Option<&'a str>,
        /// Non-fatal problems with the output (document diagnostics).
        warnings: &'a [String],
    },
    /// An outcome arrived for a ticket that is no longer pending.
    OutcomeDiscarded { ticket: u64 },
    /// The session was closed.
    Closed,
}

/// Observer of session events.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let PipelineEvent::PhaseFailed { error, .. } = event {
///         eprintln!("{error}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to several handlers, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(UiEventHandler::new(ui_state, &config.model));
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::IntentRejected { intent, error } => {
                warn!("Rejected {intent}: {error}");
            }
            PipelineEvent::PhaseStarted {
                phase,
                ticket,
                with_feedback,
            } => {
                info!(
                    "Running {phase} (ticket {ticket}){}",
                    if *with_feedback { " with feedback" } else { "" }
                );
            }
            PipelineEvent::Completion { phase, text } => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "{phase} output: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            PipelineEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Token usage: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            PipelineEvent::PhaseFailed { phase, error: err } => {
                if err.is_recoverable() {
                    warn!("{phase} failed ({}): {err}", err.kind());
                } else {
                    error!("{phase} failed ({}): {err}", err.kind());
                }
            }
            PipelineEvent::StateChanged {
                state, warnings, ..
            } => {
                info!("State: {state}");
                for w in warnings.iter() {
                    warn!("Document: {w}");
                }
            }
            PipelineEvent::OutcomeDiscarded { ticket } => {
                debug!("Discarded late outcome for ticket {ticket}");
            }
            PipelineEvent::Closed => {
                info!("Session closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn composite_calls_all_handlers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| a.lock().unwrap().push("a")))
            .with(NoopHandler)
            .with(FnEventHandler::new(move |_| b.lock().unwrap().push("b")));
        handler.on_event(&PipelineEvent::Closed);
        assert_eq!(*seen.lock().unwrap(), ["a", "b"]);
    }

    #[test]
    fn logging_handler_accepts_every_event() {
        let err = PipelineError::Busy;
        let warnings = vec!["document declares no sh:NodeShape".to_string()];
        let long = "x".repeat(300);
        let events = [
            PipelineEvent::IntentRejected {
                intent: "advance",
                error: &err,
            },
            PipelineEvent::PhaseStarted {
                phase: PipelinePhase::EntityExtraction,
                ticket: 1,
                with_feedback: true,
            },
            PipelineEvent::Completion {
                phase: PipelinePhase::EntityExtraction,
                text: &long,
            },
            PipelineEvent::StateChanged {
                state: PipelineState::DocumentReady,
                output: None,
                warnings: &warnings,
            },
            PipelineEvent::OutcomeDiscarded { ticket: 3 },
        ];
        for event in &events {
            LoggingHandler.on_event(event);
        }
    }

    #[test]
    fn phase_failures_log_by_recoverability() {
        use crate::ui::LogLevel;
        use crate::ui::tracing::UiTracingLayer;
        use tracing_subscriber::layer::SubscriberExt;

        let (layer, buffer) = UiTracingLayer::new(LogLevel::Info);
        let subscriber = tracing_subscriber::registry().with(layer);
        let timeout = PipelineError::Timeout {
            after: std::time::Duration::from_millis(500),
        };
        let defect = PipelineError::InvalidPhaseContext("no entities".into());
        tracing::subscriber::with_default(subscriber, || {
            for error in [&timeout, &defect] {
                LoggingHandler.on_event(&PipelineEvent::PhaseFailed {
                    phase: PipelinePhase::PropertyExtraction,
                    error,
                });
            }
        });
        let levels: Vec<_> = buffer.drain().into_iter().map(|l| l.level).collect();
        assert_eq!(levels, [LogLevel::Warn, LogLevel::Error]);
    }
}
