//! Terminal UI for the shapegen pipeline.
//!
//! Renders a shared [`UiState`] (ratatui + crossterm) on a dedicated OS
//! thread and turns key presses into [`Intent`]s sent to a running
//! [`Session`](shapegen::session::Session). The session mirrors every
//! transition back into the state through
//! [`UiEventHandler`](shapegen::ui::event_handler::UiEventHandler).
//!
//! # Quick start
//!
//! ```ignore
//! let ui_state = Arc::new(Mutex::new(UiState::new(&config.model)));
//! let (intent_tx, intent_rx) = tokio::sync::mpsc::unbounded_channel();
//! let handle = spawn_tui(ui_state.clone(), intent_tx, TuiConfig::default());
//! session.run(intent_rx).await;
//! handle.join().ok();
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{cursor, execute};
use ratatui::prelude::*;
use shapegen::pipeline::{Intent, PipelineState};
use shapegen::ui::tracing::LogBuffer;
use shapegen::ui::{ActivityEntry, UiState, push_activity, set_use_case};
use tokio::sync::mpsc::UnboundedSender;

mod app;
mod input;
mod render;

pub use render::{activity_line, log_level_style, output_title, truncate_str};

use app::App;
use input::{KeyAction, handle_key_event};
use render::render;

/// Configuration for the TUI.
pub struct TuiConfig {
    /// Where `w` writes the current document.
    pub output_path: PathBuf,
    /// Log buffer from the tracing layer, drained into `UiState::logs`
    /// once per frame.
    pub log_buffer: Option<LogBuffer>,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("shapes.ttl"),
            log_buffer: None,
        }
    }
}

/// Spawn the TUI on a dedicated OS thread.
pub fn spawn_tui(
    state: Arc<Mutex<UiState>>,
    intents: UnboundedSender<Intent>,
    config: TuiConfig,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(e) = run_tui(state, intents, &config) {
            eprintln!("TUI error: {e}");
        }
    })
}

/// Run the TUI event loop (blocking). Call this from a dedicated OS thread.
///
/// Returns when the user quits; a `Close` intent is sent on the way out.
pub fn run_tui(
    state: Arc<Mutex<UiState>>,
    intents: UnboundedSender<Intent>,
    config: &TuiConfig,
) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut app = App::new();

    loop {
        let quit = state.lock().map(|s| s.quit_requested).unwrap_or(true);
        if app.should_quit || quit {
            break;
        }

        if let Some(ref log_buf) = config.log_buffer {
            log_buf.flush_into(&state);
        }

        terminal.draw(|frame| render(frame, &state, &app))?;

        // 100ms poll keeps the busy indicator and logs moving.
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && let Some(action) = handle_key_event(key, &mut app, &state)
        {
            perform(action, &mut app, &state, &intents, config);
        }
    }

    if let Ok(mut s) = state.lock() {
        s.quit_requested = true;
    }
    // The session may already be gone.
    let _ = intents.send(Intent::Close);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;
    terminal.show_cursor()?;
    Ok(())
}

fn perform(
    action: KeyAction,
    app: &mut App,
    state: &Arc<Mutex<UiState>>,
    intents: &UnboundedSender<Intent>,
    config: &TuiConfig,
) {
    match action {
        KeyAction::Dispatch(intent) => {
            if let Intent::SetInput(text) = &intent {
                set_use_case(state, text);
            }
            if intents.send(intent).is_err() {
                app.status_message = Some("The session has ended. Press [q] to quit.".into());
            }
        }
        KeyAction::WriteDocument => {
            app.status_message = Some(write_document(state, config));
        }
    }
}

/// Write the current document to `config.output_path`, returning the
/// status line to show.
fn write_document(state: &Arc<Mutex<UiState>>, config: &TuiConfig) -> String {
    let document = state
        .lock()
        .ok()
        .filter(|s| s.state == PipelineState::DocumentReady)
        .map(|s| s.output.clone());
    let Some(document) = document else {
        return "No document yet; advance to the document phase first.".into();
    };

    let path = config.output_path.display().to_string();
    match std::fs::write(&config.output_path, document) {
        Ok(()) => {
            tracing::info!("Wrote {path}");
            push_activity(state, ActivityEntry::Note(format!("wrote {path}")));
            format!("Wrote {path}.")
        }
        Err(e) => {
            tracing::warn!("Failed to write {path}: {e}");
            format!("Failed to write {path}: {e}")
        }
    }
}
