//! `EventHandler` → `UiState` bridge.
//!
//! Compose it with logging in the usual way:
//!
//! ```ignore
//! let handler = CompositeEventHandler::new()
//!     .with(LoggingHandler)
//!     .with(UiEventHandler::new(ui_state.clone(), &config.model));
//! ```

use std::sync::{Arc, Mutex};

use crate::UsageInfo;
use crate::api::tracing::{ModelPricing, pricing_for_model};
use crate::events::{EventHandler, PipelineEvent};

use super::{ActivityEntry, UiState, push_activity, set_error, update_state};

/// Mirrors [`PipelineEvent`]s into a shared [`UiState`].
///
/// Purely a state updater; it never feeds intents back into the session.
pub struct UiEventHandler {
    state: Arc<Mutex<UiState>>,
    pricing: ModelPricing,
}

impl UiEventHandler {
    pub fn new(state: Arc<Mutex<UiState>>, model: &str) -> Self {
        Self {
            state,
            pricing: pricing_for_model(model),
        }
    }
}

impl EventHandler for UiEventHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::StateChanged {
                state,
                output,
                warnings,
            } => {
                update_state(&self.state, *state, *output, warnings);
                if state.ready_phase().is_some() {
                    push_activity(&self.state, ActivityEntry::Settled(*state));
                }
            }
            PipelineEvent::PhaseStarted {
                phase,
                with_feedback,
                ..
            } => {
                push_activity(
                    &self.state,
                    ActivityEntry::Started {
                        phase: *phase,
                        with_feedback: *with_feedback,
                    },
                );
            }
            PipelineEvent::PhaseFailed { phase, error } => {
                let message = error.to_string();
                set_error(&self.state, &message);
                push_activity(
                    &self.state,
                    ActivityEntry::Failed {
                        phase: *phase,
                        message,
                    },
                );
            }
            PipelineEvent::IntentRejected { intent, error } => {
                let message = error.to_string();
                set_error(&self.state, &message);
                push_activity(
                    &self.state,
                    ActivityEntry::Rejected {
                        intent: (*intent).to_string(),
                        message,
                    },
                );
            }
            PipelineEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                let usage = UsageInfo {
                    prompt_tokens: Some(*prompt_tokens),
                    completion_tokens: Some(*completion_tokens),
                    total_tokens: Some(prompt_tokens + completion_tokens),
                };
                if let Ok(mut s) = self.state.lock() {
                    s.costs.record(&usage, &self.pricing);
                }
            }
            PipelineEvent::Closed => {
                push_activity(&self.state, ActivityEntry::Note("session closed".into()));
            }
            PipelineEvent::Completion { .. } | PipelineEvent::OutcomeDiscarded { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use crate::pipeline::{PipelinePhase, PipelineState};
    use std::time::Duration;

    fn handler() -> (UiEventHandler, Arc<Mutex<UiState>>) {
        let state = Arc::new(Mutex::new(UiState::new("openai/gpt-4o-mini")));
        (UiEventHandler::new(state.clone(), "openai/gpt-4o-mini"), state)
    }

    #[test]
    fn phase_lifecycle_updates_state() {
        let (h, state) = handler();
        h.on_event(&PipelineEvent::PhaseStarted {
            phase: PipelinePhase::EntityExtraction,
            ticket: 1,
            with_feedback: false,
        });
        h.on_event(&PipelineEvent::StateChanged {
            state: PipelineState::AwaitingEntities,
            output: None,
            warnings: &[],
        });
        assert!(state.lock().unwrap().busy);

        h.on_event(&PipelineEvent::StateChanged {
            state: PipelineState::EntitiesReady,
            output: Some("Car|A vehicle"),
            warnings: &[],
        });
        let s = state.lock().unwrap();
        assert!(!s.busy);
        assert_eq!(s.output, "Car|A vehicle");
        assert_eq!(
            s.activity,
            [
                ActivityEntry::Started {
                    phase: PipelinePhase::EntityExtraction,
                    with_feedback: false,
                },
                ActivityEntry::Settled(PipelineState::EntitiesReady),
            ]
        );
    }

    #[test]
    fn failures_set_error() {
        let (h, state) = handler();
        let err = PipelineError::Timeout {
            after: Duration::from_secs(60),
        };
        h.on_event(&PipelineEvent::PhaseFailed {
            phase: PipelinePhase::PropertyExtraction,
            error: &err,
        });
        let s = state.lock().unwrap();
        assert_eq!(s.last_error.as_deref(), Some(err.to_string().as_str()));
        assert!(matches!(s.activity[0], ActivityEntry::Failed { .. }));
    }

    #[test]
    fn rejection_is_recorded() {
        let (h, state) = handler();
        h.on_event(&PipelineEvent::IntentRejected {
            intent: "advance",
            error: &PipelineError::Busy,
        });
        let s = state.lock().unwrap();
        assert!(s.last_error.is_some());
        assert!(matches!(
            &s.activity[0],
            ActivityEntry::Rejected { intent, .. } if intent == "advance"
        ));
    }

    #[test]
    fn token_usage_accumulates_cost() {
        let (h, state) = handler();
        for _ in 0..2 {
            h.on_event(&PipelineEvent::TokenUsage {
                prompt_tokens: 1000,
                completion_tokens: 500,
            });
        }
        let s = state.lock().unwrap();
        assert_eq!(s.costs.calls, 2);
        assert_eq!(s.costs.total_tokens(), 3000);
        assert!(s.costs.estimated_cost_usd > 0.0);
    }
}
