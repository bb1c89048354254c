//! Rendering for the pipeline TUI.

use std::sync::{Arc, Mutex};

use ratatui::prelude::*;
use ratatui::widgets::*;
use shapegen::pipeline::PipelineState;
use shapegen::ui::{ActivityEntry, LogLevel, LogLine, UiState};

use crate::app::{ActivePane, App, InputMode};

// ── Public Utilities ──────────────────────────────────────────────────

/// Truncate to at most `max` characters, appending "..." if truncated.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Map a log level to a ratatui [`Style`].
pub fn log_level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Trace => Style::default().fg(Color::DarkGray),
        LogLevel::Debug => Style::default().fg(Color::Cyan),
        LogLevel::Info => Style::default().fg(Color::Green),
        LogLevel::Warn => Style::default().fg(Color::Yellow),
        LogLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// Title of the output pane for a controller state.
pub fn output_title(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Idle | PipelineState::AwaitingEntities => " Use case ",
        PipelineState::EntitiesReady | PipelineState::AwaitingProperties => " Entities ",
        PipelineState::PropertiesReady | PipelineState::AwaitingDocument => " Properties ",
        PipelineState::DocumentReady => " SHACL document ",
        PipelineState::Terminated => " Closed ",
    }
}

/// One-line summary of a timeline entry.
pub fn activity_line(entry: &ActivityEntry) -> String {
    match entry {
        ActivityEntry::Started {
            phase,
            with_feedback: true,
        } => format!("~ {phase} (feedback)"),
        ActivityEntry::Started { phase, .. } => format!("~ {phase}"),
        ActivityEntry::Settled(state) => format!("+ {state}"),
        ActivityEntry::Failed { phase, message } => format!("! {phase}: {message}"),
        ActivityEntry::Rejected { intent, message } => format!("x {intent}: {message}"),
        ActivityEntry::Note(note) => format!("- {note}"),
    }
}

// ── Root Render ───────────────────────────────────────────────────────

/// Snapshot of the `UiState` fields needed for one frame, so the lock is
/// held only for the clone and never during widget construction.
struct RenderSnapshot {
    state: PipelineState,
    model: String,
    use_case: String,
    output: String,
    warnings: Vec<String>,
    last_error: Option<String>,
    busy: bool,
    running: bool,
    activity: Vec<ActivityEntry>,
    cost: String,
    logs: Vec<LogLine>,
}

pub(crate) fn render(frame: &mut Frame, state: &Arc<Mutex<UiState>>, app: &App) {
    let area = frame.area();

    // [5] status | [flex] middle | [3] input bar.
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(area);

    let Some(snap) = snapshot(state, app.show_logs) else {
        return;
    };

    render_status(frame, chunks[0], &snap);
    render_input(frame, chunks[2], app);

    let middle = if app.show_logs {
        let mid = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        render_logs(frame, mid[1], &snap.logs, app);
        mid[0]
    } else {
        chunks[1]
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(middle);
    render_output(frame, columns[0], &snap, app);
    render_activity(frame, columns[1], &snap.activity);
}

fn snapshot(state: &Arc<Mutex<UiState>>, with_logs: bool) -> Option<RenderSnapshot> {
    let s = state.lock().ok()?;
    Some(RenderSnapshot {
        state: s.state,
        model: s.model.clone(),
        use_case: s.use_case.clone(),
        output: s.output.clone(),
        warnings: s.warnings.clone(),
        last_error: s.last_error.clone(),
        busy: s.busy,
        running: s.running,
        activity: s.activity.clone(),
        cost: format!(
            "{} call(s), {} tokens, ${:.4}",
            s.costs.calls,
            s.costs.total_tokens(),
            s.costs.estimated_cost_usd
        ),
        logs: if with_logs { s.logs.clone() } else { Vec::new() },
    })
}

// ── Status Pane ───────────────────────────────────────────────────────

fn render_status(frame: &mut Frame, area: Rect, snap: &RenderSnapshot) {
    let label = Style::default().fg(Color::DarkGray);
    let state_style = if snap.busy {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    };

    let mut state_line = vec![
        Span::styled("State: ", label),
        Span::styled(snap.state.label(), state_style),
    ];
    if snap.busy {
        state_line.push(Span::styled(
            "   waiting for the model...",
            Style::default().fg(Color::Yellow),
        ));
    }

    let use_case = if snap.use_case.is_empty() {
        "(none, press [e])".to_string()
    } else {
        truncate_str(
            snap.use_case.lines().next().unwrap_or_default(),
            area.width.saturating_sub(14) as usize,
        )
    };

    let lines = vec![
        Line::from(state_line),
        Line::from(vec![
            Span::styled("Model: ", label),
            Span::raw(snap.model.clone()),
            Span::styled("   Usage: ", label),
            Span::styled(snap.cost.clone(), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![Span::styled("Use case: ", label), Span::raw(use_case)]),
    ];

    let title = if snap.running {
        " shapegen "
    } else {
        " shapegen [closed] "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue))
        .title(title);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

// ── Output Pane ───────────────────────────────────────────────────────

fn render_output(frame: &mut Frame, area: Rect, snap: &RenderSnapshot, app: &App) {
    let mut lines: Vec<Line> = Vec::new();

    if let Some(err) = &snap.last_error {
        lines.push(Line::from(Span::styled(
            format!("Error: {err}"),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
    }
    for w in &snap.warnings {
        lines.push(Line::from(Span::styled(
            format!("warning: {w}"),
            Style::default().fg(Color::Yellow),
        )));
    }
    if !snap.warnings.is_empty() {
        lines.push(Line::from(""));
    }

    let body = if snap.state == PipelineState::Idle && snap.output.is_empty() {
        snap.use_case.as_str()
    } else {
        snap.output.as_str()
    };
    let text_style = if snap.busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::White)
    };
    for line in body.lines() {
        lines.push(Line::from(Span::styled(line, text_style)));
    }

    let border_color = if app.active_pane == ActivePane::Output {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(output_title(snap.state));

    let max_scroll = lines.len().saturating_sub(1);
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((app.output_scroll.min(max_scroll) as u16, 0))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

// ── Activity Pane ─────────────────────────────────────────────────────

fn render_activity(frame: &mut Frame, area: Rect, activity: &[ActivityEntry]) {
    let inner_height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = activity
        .iter()
        .map(|entry| {
            let style = match entry {
                ActivityEntry::Started { .. } => Style::default().fg(Color::Yellow),
                ActivityEntry::Settled(_) => Style::default().fg(Color::Green),
                ActivityEntry::Failed { .. } | ActivityEntry::Rejected { .. } => {
                    Style::default().fg(Color::Red)
                }
                ActivityEntry::Note(_) => Style::default().fg(Color::DarkGray),
            };
            Line::from(Span::styled(activity_line(entry), style))
        })
        .collect();

    let scroll = lines.len().saturating_sub(inner_height);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Activity ");
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((scroll as u16, 0))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

// ── Log Pane ──────────────────────────────────────────────────────────

fn render_logs(frame: &mut Frame, area: Rect, logs: &[LogLine], app: &App) {
    let inner_height = area.height.saturating_sub(2) as usize;

    let lines: Vec<Line> = logs
        .iter()
        .map(|log| {
            Line::from(vec![
                Span::styled(format!("{} ", log.time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{} ", log.level.label()), log_level_style(log.level)),
                Span::raw(log.message.as_str()),
            ])
        })
        .collect();

    let scroll = lines
        .len()
        .saturating_sub(inner_height)
        .saturating_sub(app.log_scroll);

    let border_color = if app.active_pane == ActivePane::Log {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Log ");
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((scroll as u16, 0))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

// ── Input Bar ─────────────────────────────────────────────────────────

fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let (title, style) = match app.input_mode {
        InputMode::Normal => {
            let hint = app.status_message.clone().unwrap_or_else(|| {
                "[e] use case  [n] next  [b] back  [f] feedback  [w] write  [,] logs  [q] quit"
                    .to_string()
            });
            (format!(" {hint} "), Style::default().fg(Color::DarkGray))
        }
        InputMode::EditUseCase => (
            " Use case: [Enter] submit  [Esc] cancel ".to_string(),
            Style::default().fg(Color::Green),
        ),
        InputMode::Feedback => (
            " Feedback for this phase: [Enter] re-run  [Esc] cancel ".to_string(),
            Style::default().fg(Color::Cyan),
        ),
    };

    let input_text = match app.input_mode {
        InputMode::Normal => String::new(),
        InputMode::EditUseCase | InputMode::Feedback => {
            format!("> {}\u{2588}", app.input_buffer)
        }
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title);
    frame.render_widget(Paragraph::new(input_text).block(block), area);
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use shapegen::pipeline::PipelinePhase;

    #[test]
    fn truncate_str_counts_chars() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn output_titles_follow_state() {
        assert_eq!(output_title(PipelineState::Idle), " Use case ");
        assert_eq!(output_title(PipelineState::AwaitingProperties), " Entities ");
        assert_eq!(output_title(PipelineState::DocumentReady), " SHACL document ");
    }

    #[test]
    fn activity_lines() {
        let started = ActivityEntry::Started {
            phase: PipelinePhase::PropertyExtraction,
            with_feedback: true,
        };
        assert_eq!(activity_line(&started), "~ property extraction (feedback)");
        assert_eq!(
            activity_line(&ActivityEntry::Settled(PipelineState::EntitiesReady)),
            "+ entities ready"
        );
        let rejected = ActivityEntry::Rejected {
            intent: "advance".into(),
            message: "session is closed".into(),
        };
        assert_eq!(activity_line(&rejected), "x advance: session is closed");
    }

    #[test]
    fn renders_output_and_warnings() {
        let state = Arc::new(Mutex::new(UiState::new("openai/gpt-4o")));
        {
            let mut s = state.lock().unwrap();
            s.state = PipelineState::DocumentReady;
            s.output = "ex:CarShape a sh:NodeShape .".into();
            s.warnings = vec!["node shape ex:CarShape has no sh:targetClass".into()];
        }
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        let app = App::new();
        terminal.draw(|frame| render(frame, &state, &app)).unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("document ready"));
        assert!(text.contains("ex:CarShape a sh:NodeShape ."));
        assert!(text.contains("warning: node shape"));
    }
}
