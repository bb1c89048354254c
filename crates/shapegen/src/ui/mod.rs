//! Display state shared between a session and a frontend.
//!
//! ```text
//! Session ──events──▶ UiEventHandler ──writes──▶ Arc<Mutex<UiState>> ◀──reads── TUI
//! ```
//!
//! [`UiState`] holds plain data only; the terminal UI renders it and the
//! [`event_handler::UiEventHandler`] keeps it in sync with the session.
//! Log lines captured by [`tracing::UiTracingLayer`] are drained into it by
//! the frontend once per frame.

pub mod event_handler;
pub mod tracing;

use std::sync::{Arc, Mutex};

use crate::api::tracing::CostTracker;
use crate::pipeline::{PipelinePhase, PipelineState};

/// Maximum log lines kept in memory.
pub const MAX_LOG_LINES: usize = 2000;
/// Trim to this many when the cap is exceeded.
pub const LOG_TRIM_TO: usize = 1200;

/// Maximum activity entries kept in memory.
pub const MAX_ACTIVITY: usize = 200;

// ── Activity ──────────────────────────────────────────────────────────

/// One line of the session timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivityEntry {
    /// A phase was started, possibly with a feedback note.
    Started {
        phase: PipelinePhase,
        with_feedback: bool,
    },
    /// A phase finished and the session settled here.
    Settled(PipelineState),
    /// A phase failed and was rolled back.
    Failed {
        phase: PipelinePhase,
        message: String,
    },
    /// An intent was refused.
    Rejected { intent: String, message: String },
    /// Free-form note from the frontend (e.g. "document written").
    Note(String),
}

// ── Logs ──────────────────────────────────────────────────────────────

/// A single log line captured from tracing.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub time: String,
    pub level: LogLevel,
    pub message: String,
}

/// Log severity level (mirrors tracing levels).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Short fixed-width label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

impl From<&::tracing::Level> for LogLevel {
    fn from(level: &::tracing::Level) -> Self {
        match *level {
            ::tracing::Level::TRACE => Self::Trace,
            ::tracing::Level::DEBUG => Self::Debug,
            ::tracing::Level::INFO => Self::Info,
            ::tracing::Level::WARN => Self::Warn,
            ::tracing::Level::ERROR => Self::Error,
        }
    }
}

// ── UiState ───────────────────────────────────────────────────────────

/// What the frontend shows.
pub struct UiState {
    /// Controller state as of the last event.
    pub state: PipelineState,
    pub model: String,
    /// Use case as last submitted.
    pub use_case: String,
    /// Output of the current phase (records or Turtle).
    pub output: String,
    /// Document diagnostics for the current output.
    pub warnings: Vec<String>,
    /// Most recent error, cleared by the next successful transition.
    pub last_error: Option<String>,
    /// A completion call is in flight; the frontend stops dispatching.
    pub busy: bool,
    pub activity: Vec<ActivityEntry>,
    pub costs: CostTracker,
    pub logs: Vec<LogLine>,
    /// Cleared once the session loop has ended.
    pub running: bool,
    /// Set by the frontend when the user asks to quit.
    pub quit_requested: bool,
}

impl UiState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            state: PipelineState::Idle,
            model: String::new(),
            use_case: String::new(),
            output: String::new(),
            warnings: Vec::new(),
            last_error: None,
            busy: false,
            activity: Vec::new(),
            costs: CostTracker::new(),
            logs: Vec::new(),
            running: true,
            quit_requested: false,
        }
    }
}

// ── Convenience Updaters ──────────────────────────────────────────────

/// Lock the shared state mutex and run a closure on the guard.
/// Poisoned locks are ignored.
macro_rules! with_state {
    ($state:expr, |$s:ident| $body:block) => {
        if let Ok(mut $s) = $state.lock() {
            $body
        }
    };
}

/// Mirror a settled controller state.
pub fn update_state(
    state: &Arc<Mutex<UiState>>,
    pipeline: PipelineState,
    output: Option<&str>,
    warnings: &[String],
) {
    with_state!(state, |s| {
        s.state = pipeline;
        s.busy = pipeline.is_awaiting();
        if let Some(output) = output {
            s.output = output.to_string();
        } else if !s.busy {
            s.output.clear();
        }
        s.warnings = warnings.to_vec();
        if s.busy {
            s.last_error = None;
        }
    });
}

/// Record the use case the frontend submitted.
pub fn set_use_case(state: &Arc<Mutex<UiState>>, use_case: &str) {
    with_state!(state, |s| { s.use_case = use_case.to_string() });
}

/// Show an error until the next phase starts.
pub fn set_error(state: &Arc<Mutex<UiState>>, message: &str) {
    with_state!(state, |s| { s.last_error = Some(message.to_string()) });
}

/// Append to the timeline, keeping the most recent entries.
pub fn push_activity(state: &Arc<Mutex<UiState>>, entry: ActivityEntry) {
    with_state!(state, |s| {
        s.activity.push(entry);
        if s.activity.len() > MAX_ACTIVITY {
            let drain = s.activity.len() - MAX_ACTIVITY;
            s.activity.drain(..drain);
        }
    });
}

/// Mark the session loop as finished.
pub fn mark_stopped(state: &Arc<Mutex<UiState>>) {
    with_state!(state, |s| {
        s.running = false;
        s.busy = false;
    });
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Arc<Mutex<UiState>> {
        Arc::new(Mutex::new(UiState::new("openai/gpt-4o")))
    }

    #[test]
    fn log_level_labels_and_order() {
        assert_eq!(LogLevel::Info.label(), "INFO ");
        assert_eq!(LogLevel::Error.label(), "ERROR");
        assert!(LogLevel::Warn > LogLevel::Debug);
        assert_eq!(LogLevel::from(&::tracing::Level::WARN), LogLevel::Warn);
    }

    #[test]
    fn ui_state_defaults() {
        let state = UiState::new("m");
        assert_eq!(state.model, "m");
        assert_eq!(state.state, PipelineState::Idle);
        assert!(state.running);
        assert!(!state.busy);
        assert!(state.output.is_empty());
        assert_eq!(state.costs.calls, 0);
    }

    #[test]
    fn awaiting_keeps_previous_output_and_sets_busy() {
        let state = shared();
        update_state(&state, PipelineState::EntitiesReady, Some("Car|A vehicle"), &[]);
        set_error(&state, "boom");
        update_state(&state, PipelineState::AwaitingProperties, None, &[]);
        let s = state.lock().unwrap();
        assert!(s.busy);
        assert_eq!(s.output, "Car|A vehicle");
        assert!(s.last_error.is_none());
    }

    #[test]
    fn idle_clears_output() {
        let state = shared();
        update_state(&state, PipelineState::EntitiesReady, Some("Car|A vehicle"), &[]);
        update_state(&state, PipelineState::Idle, None, &[]);
        assert!(state.lock().unwrap().output.is_empty());
    }

    #[test]
    fn warnings_replace_previous() {
        let state = shared();
        let w = vec!["document declares no sh:NodeShape".to_string()];
        update_state(&state, PipelineState::DocumentReady, Some("@prefix"), &w);
        assert_eq!(state.lock().unwrap().warnings, w);
        update_state(&state, PipelineState::PropertiesReady, Some("Car|name|n|Text"), &[]);
        assert!(state.lock().unwrap().warnings.is_empty());
    }

    #[test]
    fn activity_is_capped() {
        let state = shared();
        for i in 0..MAX_ACTIVITY + 10 {
            push_activity(&state, ActivityEntry::Note(i.to_string()));
        }
        let s = state.lock().unwrap();
        assert_eq!(s.activity.len(), MAX_ACTIVITY);
        assert_eq!(s.activity[0], ActivityEntry::Note("10".into()));
    }

    #[test]
    fn stopped_clears_busy() {
        let state = shared();
        update_state(&state, PipelineState::AwaitingEntities, None, &[]);
        mark_stopped(&state);
        let s = state.lock().unwrap();
        assert!(!s.running);
        assert!(!s.busy);
    }
}
