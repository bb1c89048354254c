//! The phase state machine.
//!
//! ```text
//! Idle ──start──▶ AwaitingEntities ──▶ EntitiesReady ──advance──▶ AwaitingProperties
//!   ▲                                   │  ▲                               │
//!   └───────────── retreat ─────────────┘  └──────── retreat ──── PropertiesReady ◀┘
//!                                                                      │  ▲
//!                           DocumentReady ◀── AwaitingDocument ◀─advance┘  │
//!                                 └──────────────── retreat ────────────────┘
//! ```
//!
//! Any state may `close` into `Terminated`. Every `*Ready` state accepts
//! feedback, which re-runs the same phase.
//!
//! [`PhaseController`] never calls a model itself. A transition that needs
//! one returns a [`PhaseRequest`] carrying a ticket; the caller runs the
//! completion oracle and hands the outcome back to
//! [`PhaseController::resolve`]. Outcomes for any ticket other than the one
//! pending (including everything after `close`) are discarded without
//! touching the controller, so a late answer can never mutate a closed
//! session.
//!
//! On failure the controller returns to the state it was in before the
//! transition, with all outputs intact.

use tracing::{info, warn};

use crate::PipelineError;
use crate::oracle::{ValidationOracle, ValidationReport};
use crate::prompt::{self, Feedback, PhaseContext};
use crate::records::{
    EntityRecord, PropertyRecord, format_entities, format_properties, parse_entities,
    parse_properties,
};
use crate::shapes::{ConstraintDocument, render_skeleton};

/// One of the three model-backed phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    EntityExtraction,
    PropertyExtraction,
    DocumentGeneration,
}

impl PipelinePhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::EntityExtraction => "entity extraction",
            Self::PropertyExtraction => "property extraction",
            Self::DocumentGeneration => "document generation",
        }
    }

    /// State while this phase's completion is in flight.
    pub fn awaiting(self) -> PipelineState {
        match self {
            Self::EntityExtraction => PipelineState::AwaitingEntities,
            Self::PropertyExtraction => PipelineState::AwaitingProperties,
            Self::DocumentGeneration => PipelineState::AwaitingDocument,
        }
    }

    /// State once this phase's output is available.
    pub fn ready(self) -> PipelineState {
        match self {
            Self::EntityExtraction => PipelineState::EntitiesReady,
            Self::PropertyExtraction => PipelineState::PropertiesReady,
            Self::DocumentGeneration => PipelineState::DocumentReady,
        }
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    AwaitingEntities,
    EntitiesReady,
    AwaitingProperties,
    PropertiesReady,
    AwaitingDocument,
    DocumentReady,
    Terminated,
}

impl PipelineState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingEntities => "awaiting entities",
            Self::EntitiesReady => "entities ready",
            Self::AwaitingProperties => "awaiting properties",
            Self::PropertiesReady => "properties ready",
            Self::AwaitingDocument => "awaiting document",
            Self::DocumentReady => "document ready",
            Self::Terminated => "terminated",
        }
    }

    /// Whether a completion call is in flight.
    pub fn is_awaiting(self) -> bool {
        matches!(
            self,
            Self::AwaitingEntities | Self::AwaitingProperties | Self::AwaitingDocument
        )
    }

    /// The phase whose output is shown in this `*Ready` state.
    pub fn ready_phase(self) -> Option<PipelinePhase> {
        match self {
            Self::EntitiesReady => Some(PipelinePhase::EntityExtraction),
            Self::PropertiesReady => Some(PipelinePhase::PropertyExtraction),
            Self::DocumentReady => Some(PipelinePhase::DocumentGeneration),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A user command from the presentation surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SetInput(String),
    Advance,
    Retreat,
    GiveFeedback(String),
    Close,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SetInput(_) => "set input",
            Self::Advance => "advance",
            Self::Retreat => "retreat",
            Self::GiveFeedback(_) => "give feedback",
            Self::Close => "close",
        }
    }
}

/// A completion the caller must run on the controller's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRequest {
    pub ticket: u64,
    pub phase: PipelinePhase,
    pub prompt: String,
}

/// What an intent did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A completion is now pending.
    Request(PhaseRequest),
    /// The transition finished without a model call.
    Settled(PipelineState),
}

/// What happened to a completion outcome handed to [`PhaseController::resolve`].
#[derive(Debug)]
pub enum Resolution {
    /// The phase output was replaced; the controller is in this state.
    Ready(PipelineState),
    /// The phase failed; the controller is back in its pre-transition state.
    Failed(PipelineError),
    /// Stale ticket or closed session; nothing changed.
    Discarded,
}

/// The document phase output.
///
/// A malformed or non-conforming document still reaches `DocumentReady`;
/// the problems are carried here as warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub document: ConstraintDocument,
    /// Report for `document`, absent when it could not be parsed.
    pub report: Option<ValidationReport>,
    /// Why the model's document could not be parsed, if it could not.
    pub malformed: Option<String>,
    /// `document` is the deterministic skeleton, not the model's answer.
    pub fallback_used: bool,
}

impl GeneratedDocument {
    /// Whether the document parsed and passed every check.
    pub fn conforms(&self) -> bool {
        self.malformed.is_none() && self.report.as_ref().is_some_and(|r| r.conforms)
    }

    /// Display warnings, malformed-document notice first.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(cause) = &self.malformed {
            warnings.push(if self.fallback_used {
                format!("model output was not valid Turtle ({cause}); using the skeleton document")
            } else {
                format!("document is not valid Turtle: {cause}")
            });
        }
        if let Some(report) = &self.report {
            warnings.extend(report.diagnostics.iter().cloned());
        }
        warnings
    }
}

#[derive(Debug)]
struct Pending {
    ticket: u64,
    phase: PipelinePhase,
    rollback: PipelineState,
}

/// The three-phase controller for one session.
#[derive(Debug)]
pub struct PhaseController {
    state: PipelineState,
    use_case: String,
    entities: Vec<EntityRecord>,
    properties: Vec<PropertyRecord>,
    document: Option<GeneratedDocument>,
    pending: Option<Pending>,
    next_ticket: u64,
    last_error: Option<String>,
    fallback_skeleton: bool,
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseController {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            use_case: String::new(),
            entities: Vec::new(),
            properties: Vec::new(),
            document: None,
            pending: None,
            next_ticket: 1,
            last_error: None,
            fallback_skeleton: false,
        }
    }

    /// Substitute the skeleton for a malformed generated document.
    pub fn with_fallback_skeleton(mut self, enabled: bool) -> Self {
        self.fallback_skeleton = enabled;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn use_case(&self) -> &str {
        &self.use_case
    }

    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub fn properties(&self) -> &[PropertyRecord] {
        &self.properties
    }

    pub fn document(&self) -> Option<&GeneratedDocument> {
        self.document.as_ref()
    }

    /// Message of the most recent failed phase, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Ticket and phase of the in-flight completion, if any.
    pub fn pending(&self) -> Option<(u64, PipelinePhase)> {
        self.pending.as_ref().map(|p| (p.ticket, p.phase))
    }

    /// Text for the current phase's output, as the user sees it.
    pub fn current_output(&self) -> Option<String> {
        match self.state.ready_phase()? {
            PipelinePhase::EntityExtraction => Some(format_entities(&self.entities)),
            PipelinePhase::PropertyExtraction => Some(format_properties(&self.properties)),
            PipelinePhase::DocumentGeneration => self
                .document
                .as_ref()
                .map(|d| d.document.as_str().to_string()),
        }
    }

    /// Apply an intent. `Close` always succeeds.
    pub fn dispatch(&mut self, intent: Intent) -> Result<Step, PipelineError> {
        match intent {
            Intent::SetInput(text) => self.set_input(text).map(|()| Step::Settled(self.state)),
            Intent::Advance => self.advance().map(Step::Request),
            Intent::Retreat => self.retreat().map(Step::Settled),
            Intent::GiveFeedback(note) => self.submit_feedback(note).map(Step::Request),
            Intent::Close => {
                self.close();
                Ok(Step::Settled(self.state))
            }
        }
    }

    fn guard(&self) -> Result<(), PipelineError> {
        if self.state == PipelineState::Terminated {
            Err(PipelineError::Terminated)
        } else if self.state.is_awaiting() {
            Err(PipelineError::Busy)
        } else {
            Ok(())
        }
    }

    fn invalid(&self, intent: &'static str) -> PipelineError {
        PipelineError::InvalidTransition {
            intent,
            state: self.state.label(),
        }
    }

    /// Replace the use case. Only allowed while idle.
    pub fn set_input(&mut self, text: impl Into<String>) -> Result<(), PipelineError> {
        self.guard()?;
        if self.state != PipelineState::Idle {
            return Err(self.invalid("set input"));
        }
        self.use_case = text.into();
        Ok(())
    }

    /// Idle → AwaitingEntities.
    pub fn start(&mut self) -> Result<PhaseRequest, PipelineError> {
        self.guard()?;
        if self.state != PipelineState::Idle {
            return Err(self.invalid("start"));
        }
        self.begin(PipelinePhase::EntityExtraction, None)
    }

    /// Run the next phase. From `Idle` this is [`start`](Self::start).
    pub fn advance(&mut self) -> Result<PhaseRequest, PipelineError> {
        self.guard()?;
        match self.state {
            PipelineState::Idle => self.begin(PipelinePhase::EntityExtraction, None),
            PipelineState::EntitiesReady => self.begin(PipelinePhase::PropertyExtraction, None),
            PipelineState::PropertiesReady => self.begin(PipelinePhase::DocumentGeneration, None),
            _ => Err(self.invalid("advance")),
        }
    }

    /// Re-run the current phase with a feedback note.
    pub fn submit_feedback(&mut self, note: impl Into<String>) -> Result<PhaseRequest, PipelineError> {
        self.guard()?;
        let note = note.into();
        let Some(phase) = self.state.ready_phase() else {
            return Err(self.invalid("give feedback"));
        };
        if note.trim().is_empty() {
            return Err(PipelineError::InvalidPhaseContext(
                "feedback note is empty".into(),
            ));
        }
        let feedback = Feedback {
            note,
            previous_output: self.current_output().unwrap_or_default(),
        };
        self.begin(phase, Some(feedback))
    }

    /// Step back one phase, dropping the current phase's output.
    pub fn retreat(&mut self) -> Result<PipelineState, PipelineError> {
        self.guard()?;
        self.state = match self.state {
            PipelineState::EntitiesReady => {
                self.entities.clear();
                PipelineState::Idle
            }
            PipelineState::PropertiesReady => {
                self.properties.clear();
                PipelineState::EntitiesReady
            }
            PipelineState::DocumentReady => {
                self.document = None;
                PipelineState::PropertiesReady
            }
            _ => return Err(self.invalid("retreat")),
        };
        self.last_error = None;
        info!("Retreated to {}", self.state);
        Ok(self.state)
    }

    /// Terminate the session. Returns the ticket that was pending, if any;
    /// its outcome will be discarded.
    pub fn close(&mut self) -> Option<u64> {
        let cancelled = self.pending.take().map(|p| p.ticket);
        if self.state != PipelineState::Terminated {
            info!("Session closed from {}", self.state);
        }
        self.state = PipelineState::Terminated;
        cancelled
    }

    fn begin(
        &mut self,
        phase: PipelinePhase,
        feedback: Option<Feedback>,
    ) -> Result<PhaseRequest, PipelineError> {
        let ctx = PhaseContext {
            use_case: &self.use_case,
            entities: &self.entities,
            properties: &self.properties,
            feedback: feedback.as_ref(),
        };
        let prompt = prompt::build(phase, &ctx)?;

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending = Some(Pending {
            ticket,
            phase,
            rollback: self.state,
        });
        self.state = phase.awaiting();
        info!(
            "Started {phase} (ticket {ticket}{})",
            if feedback.is_some() { ", with feedback" } else { "" }
        );
        Ok(PhaseRequest {
            ticket,
            phase,
            prompt,
        })
    }

    /// Hand back the outcome of a [`PhaseRequest`].
    pub fn resolve(
        &mut self,
        ticket: u64,
        outcome: Result<String, PipelineError>,
        validator: &dyn ValidationOracle,
    ) -> Resolution {
        let is_current = self.pending.as_ref().is_some_and(|p| p.ticket == ticket);
        if !is_current || self.state == PipelineState::Terminated {
            info!("Discarding outcome for stale ticket {ticket}");
            return Resolution::Discarded;
        }
        let Some(pending) = self.pending.take() else {
            return Resolution::Discarded;
        };

        match outcome.and_then(|text| self.apply(pending.phase, &text, validator)) {
            Ok(()) => {
                self.state = pending.phase.ready();
                self.last_error = None;
                info!("Finished {} (ticket {ticket})", pending.phase);
                Resolution::Ready(self.state)
            }
            Err(e) => {
                self.state = pending.rollback;
                self.last_error = Some(e.to_string());
                warn!("{} failed: {e}", pending.phase);
                Resolution::Failed(e)
            }
        }
    }

    /// Parse a completion and swap it in as the phase output.
    fn apply(
        &mut self,
        phase: PipelinePhase,
        text: &str,
        validator: &dyn ValidationOracle,
    ) -> Result<(), PipelineError> {
        match phase {
            PipelinePhase::EntityExtraction => {
                self.entities = parse_entities(text)?;
                self.properties.clear();
                self.document = None;
            }
            PipelinePhase::PropertyExtraction => {
                self.properties = parse_properties(text, &self.entities)?;
                self.document = None;
            }
            PipelinePhase::DocumentGeneration => {
                self.document = Some(self.generate(text, validator));
            }
        }
        Ok(())
    }

    fn generate(&self, text: &str, validator: &dyn ValidationOracle) -> GeneratedDocument {
        let document = ConstraintDocument::from_completion(text);
        match validator.validate(document.as_str()) {
            Ok(report) => GeneratedDocument {
                document,
                report: Some(report),
                malformed: None,
                fallback_used: false,
            },
            Err(e) => {
                let cause = match e {
                    PipelineError::MalformedDocument { cause } => cause,
                    other => other.to_string(),
                };
                warn!("Generated document is malformed: {cause}");
                if self.fallback_skeleton {
                    let skeleton =
                        ConstraintDocument::new(render_skeleton(&self.entities, &self.properties));
                    GeneratedDocument {
                        report: validator.validate(skeleton.as_str()).ok(),
                        document: skeleton,
                        malformed: Some(cause),
                        fallback_used: true,
                    }
                } else {
                    GeneratedDocument {
                        document,
                        report: None,
                        malformed: Some(cause),
                        fallback_used: false,
                    }
                }
            }
        }
    }
}
