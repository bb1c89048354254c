//! Tracing layer that captures log events for the terminal UI.
//!
//! While the TUI owns the terminal, nothing may write to stderr. The
//! [`UiTracingLayer`] instead formats each event into a [`LogLine`] and
//! pushes it into a [`LogBuffer`]; the frontend drains the buffer into
//! [`UiState::logs`](super::UiState::logs) once per frame. The buffer has its
//! own mutex, so a log call on a tokio worker never waits on rendering.

use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use super::{LOG_TRIM_TO, LogLevel, LogLine, MAX_LOG_LINES, UiState};

/// Pending log lines, shared between the layer and the frontend.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<LogLine>>>);

impl LogBuffer {
    fn push(&self, line: LogLine) {
        if let Ok(mut buf) = self.0.lock() {
            buf.push(line);
            trim(&mut buf);
        }
    }

    /// Take every pending line.
    pub fn drain(&self) -> Vec<LogLine> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }

    /// Move pending lines into `UiState::logs`. Locks the state only when
    /// there is something to move.
    pub fn flush_into(&self, state: &Arc<Mutex<UiState>>) {
        let lines = self.drain();
        if lines.is_empty() {
            return;
        }
        if let Ok(mut s) = state.lock() {
            s.logs.extend(lines);
            trim(&mut s.logs);
        }
    }
}

fn trim(lines: &mut Vec<LogLine>) {
    if lines.len() > MAX_LOG_LINES {
        let drop = lines.len() - LOG_TRIM_TO;
        lines.drain(..drop);
    }
}

/// A [`Layer`] that records events at or above a minimum level into a
/// [`LogBuffer`].
pub struct UiTracingLayer {
    buffer: LogBuffer,
    min_level: LogLevel,
}

impl UiTracingLayer {
    /// Create the layer and the buffer the frontend should drain.
    pub fn new(min_level: LogLevel) -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        (
            Self {
                buffer: buffer.clone(),
                min_level,
            },
            buffer,
        )
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for UiTracingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::from(event.metadata().level());
        if level < self.min_level {
            return;
        }
        let mut fields = FieldCollector::default();
        event.record(&mut fields);
        self.buffer.push(LogLine {
            time: Local::now().format("%H:%M:%S").to_string(),
            level,
            message: fields.render(),
        });
    }
}

/// Collects the `message` field plus any structured key/value fields.
#[derive(Default)]
struct FieldCollector {
    message: String,
    extras: Vec<String>,
}

impl FieldCollector {
    fn render(self) -> String {
        match (self.message.is_empty(), self.extras.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.extras.join(" "),
            (false, false) => format!("{} {{{}}}", self.message, self.extras.join(", ")),
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.extras.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // `format_args!` messages arrive here and print without quotes.
            self.message = format!("{value:?}");
        } else {
            self.extras.push(format!("{}={value:?}", field.name()));
        }
    }
}
