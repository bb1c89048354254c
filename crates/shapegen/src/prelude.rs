//! Convenience re-exports for common `shapegen` types.
//!
//! ```ignore
//! use shapegen::prelude::*;
//! ```
//!
//! Covers what a front-end needs to run a session: config, the two oracles,
//! the session driver, intents and states, and the event handlers. Parsing
//! helpers and the raw client live in their own modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::config::GeneratorConfig;
pub use crate::{OpenRouterClient, PipelineError};

// ── Oracles ─────────────────────────────────────────────────────────
pub use crate::oracle::{
    Completion, CompletionOracle, OpenRouterOracle, ScriptedOracle, ValidationOracle,
    ValidationReport,
};
pub use crate::validate::ShaclSyntaxValidator;

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::pipeline::{
    GeneratedDocument, Intent, PhaseController, PipelinePhase, PipelineState, Resolution,
};
pub use crate::records::{EntityRecord, PropertyRecord};
pub use crate::session::Session;
pub use crate::shapes::ConstraintDocument;

// ── Events ──────────────────────────────────────────────────────────
pub use crate::events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    PipelineEvent,
};

// ── UI state ────────────────────────────────────────────────────────
pub use crate::ui::event_handler::UiEventHandler;
pub use crate::ui::tracing::{LogBuffer, UiTracingLayer};
pub use crate::ui::{ActivityEntry, LogLevel, LogLine, UiState};
