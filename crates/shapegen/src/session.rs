//! Drives a [`PhaseController`] with real oracles.
//!
//! Completion calls run on a spawned tokio task, bounded by
//! `tokio::time::timeout`. The task sends its outcome back over a channel
//! tagged with the controller's ticket, so the controller only ever mutates
//! on the session's own task. Closing the session aborts the in-flight task;
//! anything that still arrives is discarded by ticket.
//!
//! Two ways to drive it:
//!
//! - [`Session::dispatch_and_wait`] applies one intent and, if it started a
//!   phase, waits for that phase to settle. Used by the headless CLI.
//! - [`Session::run`] is an event loop over an intent channel, used by the
//!   terminal UI so that input keeps flowing while a call is pending.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::PipelineError;
use crate::api::tracing::generate_session_id;
use crate::config::GeneratorConfig;
use crate::events::{EventHandler, NoopHandler, PipelineEvent};
use crate::oracle::{Completion, CompletionOracle, ValidationOracle};
use crate::pipeline::{
    Intent, PhaseController, PhaseRequest, PipelinePhase, PipelineState, Resolution, Step,
};

/// Outcome of one completion task.
struct Outcome {
    ticket: u64,
    phase: PipelinePhase,
    result: Result<Completion, PipelineError>,
}

/// One interactive generation session.
pub struct Session<C, V> {
    controller: PhaseController,
    oracle: Arc<C>,
    validator: V,
    handler: Box<dyn EventHandler>,
    timeout: Duration,
    session_id: String,
    results_tx: mpsc::UnboundedSender<Outcome>,
    results_rx: mpsc::UnboundedReceiver<Outcome>,
    task: Option<JoinHandle<()>>,
}

impl<C, V> Session<C, V>
where
    C: CompletionOracle + 'static,
    V: ValidationOracle,
{
    pub fn new(oracle: C, validator: V, config: &GeneratorConfig) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let session_id = generate_session_id();
        info!(
            "Session {session_id}: model={}, timeout={}s",
            oracle.model(),
            config.timeout_secs
        );
        Self {
            controller: PhaseController::new().with_fallback_skeleton(config.fallback_skeleton),
            oracle: Arc::new(oracle),
            validator,
            handler: Box::new(NoopHandler),
            timeout: Duration::from_secs(config.timeout_secs),
            session_id,
            results_tx,
            results_rx,
            task: None,
        }
    }

    /// Replace the event handler.
    pub fn with_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn controller(&self) -> &PhaseController {
        &self.controller
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> PipelineState {
        self.controller.state()
    }

    /// Apply one intent without waiting for any completion it starts.
    ///
    /// Rejections are reported to the event handler and returned.
    pub fn handle(&mut self, intent: Intent) -> Result<PipelineState, PipelineError> {
        let label = intent.label();
        let is_close = intent == Intent::Close;
        let with_feedback = matches!(intent, Intent::GiveFeedback(_));
        match self.controller.dispatch(intent) {
            Ok(Step::Request(request)) => {
                self.spawn(request, with_feedback);
                Ok(self.controller.state())
            }
            Ok(Step::Settled(state)) => {
                if is_close {
                    self.abort_task();
                    self.handler.on_event(&PipelineEvent::Closed);
                }
                self.emit_state();
                Ok(state)
            }
            Err(error) => {
                self.handler.on_event(&PipelineEvent::IntentRejected {
                    intent: label,
                    error: &error,
                });
                Err(error)
            }
        }
    }

    /// Apply one intent and wait until any phase it started has settled.
    ///
    /// Returns the settled state, or the phase error after rollback.
    pub async fn dispatch_and_wait(&mut self, intent: Intent) -> Result<PipelineState, PipelineError> {
        let state = self.handle(intent)?;
        while self.controller.pending().is_some() {
            match self.next_outcome().await {
                Some(Resolution::Ready(state)) => return Ok(state),
                Some(Resolution::Failed(error)) => return Err(error),
                Some(Resolution::Discarded) => continue,
                None => break,
            }
        }
        Ok(state)
    }

    /// Wait for the next completion outcome and apply it.
    pub async fn next_outcome(&mut self) -> Option<Resolution> {
        let outcome = self.results_rx.recv().await?;
        Some(self.apply(outcome))
    }

    /// Event loop: apply intents as they arrive and outcomes as they
    /// complete, until the session is closed or the intent channel ends.
    pub async fn run(&mut self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        while self.controller.state() != PipelineState::Terminated {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        // Rejections were already reported to the handler.
                        let _ = self.handle(intent);
                    }
                    None => self.close(),
                },
                Some(outcome) = self.results_rx.recv() => {
                    self.apply(outcome);
                }
            }
        }
        debug!("Session {} event loop finished", self.session_id);
    }

    /// Terminate the session, abandoning any pending call.
    pub fn close(&mut self) {
        if self.controller.state() != PipelineState::Terminated {
            let _ = self.handle(Intent::Close);
        }
    }

    fn spawn(&mut self, request: PhaseRequest, with_feedback: bool) {
        self.handler.on_event(&PipelineEvent::PhaseStarted {
            phase: request.phase,
            ticket: request.ticket,
            with_feedback,
        });
        self.emit_state();

        let oracle = self.oracle.clone();
        let tx = self.results_tx.clone();
        let timeout = self.timeout;
        let PhaseRequest {
            ticket,
            phase,
            prompt,
        } = request;
        self.task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, oracle.complete(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Timeout { after: timeout }),
            };
            // The receiver lives as long as the session.
            let _ = tx.send(Outcome {
                ticket,
                phase,
                result,
            });
        }));
    }

    fn apply(&mut self, outcome: Outcome) -> Resolution {
        let Outcome {
            ticket,
            phase,
            result,
        } = outcome;
        let current = self.controller.pending().is_some_and(|(t, _)| t == ticket);
        if current && let Ok(completion) = &result {
            self.handler.on_event(&PipelineEvent::Completion {
                phase,
                text: &completion.text,
            });
            if let Some(usage) = &completion.usage {
                self.handler.on_event(&PipelineEvent::TokenUsage {
                    prompt_tokens: usage.prompt_tokens.unwrap_or(0),
                    completion_tokens: usage.completion_tokens.unwrap_or(0),
                });
            }
        }

        let resolution =
            self.controller
                .resolve(ticket, result.map(|c| c.text), &self.validator);
        match &resolution {
            Resolution::Ready(_) => {
                self.task = None;
                self.emit_state();
            }
            Resolution::Failed(error) => {
                self.task = None;
                self.handler
                    .on_event(&PipelineEvent::PhaseFailed { phase, error });
                self.emit_state();
            }
            Resolution::Discarded => {
                self.handler
                    .on_event(&PipelineEvent::OutcomeDiscarded { ticket });
            }
        }
        resolution
    }

    fn emit_state(&self) {
        let output = self.controller.current_output();
        let warnings = match self.controller.state() {
            PipelineState::DocumentReady => self
                .controller
                .document()
                .map(|d| d.warnings())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        self.handler.on_event(&PipelineEvent::StateChanged {
            state: self.controller.state(),
            output: output.as_deref(),
            warnings: &warnings,
        });
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Aborted pending completion task");
        }
    }
}

impl<C, V> Drop for Session<C, V> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
