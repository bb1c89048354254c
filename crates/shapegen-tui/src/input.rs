//! Key handling. Keys map to [`KeyAction`]s; the event loop forwards
//! intents to the session.

use std::sync::{Arc, Mutex};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use shapegen::pipeline::{Intent, PipelineState};
use shapegen::ui::UiState;

use crate::app::{ActivePane, App, InputMode};

/// What a key press asks the event loop to do.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum KeyAction {
    Dispatch(Intent),
    WriteDocument,
}

pub(crate) fn handle_key_event(
    key: KeyEvent,
    app: &mut App,
    state: &Arc<Mutex<UiState>>,
) -> Option<KeyAction> {
    // Ctrl+C always quits.
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return None;
    }
    app.status_message = None;

    match app.input_mode {
        InputMode::Normal => handle_normal_key(key, app, state),
        InputMode::EditUseCase | InputMode::Feedback => handle_text_key(key, app),
    }
}

fn handle_normal_key(
    key: KeyEvent,
    app: &mut App,
    state: &Arc<Mutex<UiState>>,
) -> Option<KeyAction> {
    let (pipeline, use_case, busy) = state
        .lock()
        .map(|s| (s.state, s.use_case.clone(), s.busy))
        .unwrap_or((PipelineState::Terminated, String::new(), false));

    let dispatches = matches!(
        key.code,
        KeyCode::Char('e' | 'f' | 'n' | 'b') | KeyCode::Enter | KeyCode::Backspace
    );
    if busy && dispatches {
        app.status_message = Some("Waiting for the model; try again when it answers.".into());
        return None;
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('e') => {
            if pipeline == PipelineState::Idle {
                app.input_buffer = use_case;
                app.input_mode = InputMode::EditUseCase;
            } else {
                app.status_message =
                    Some("The use case can only be edited while idle; press [b] to go back.".into());
            }
        }
        KeyCode::Char('f') => {
            if pipeline.ready_phase().is_some() {
                app.input_buffer.clear();
                app.input_mode = InputMode::Feedback;
            } else {
                app.status_message = Some("Nothing to give feedback on yet.".into());
            }
        }
        KeyCode::Char('n') | KeyCode::Enter => {
            app.output_scroll = 0;
            return Some(KeyAction::Dispatch(Intent::Advance));
        }
        KeyCode::Char('b') | KeyCode::Backspace => {
            app.output_scroll = 0;
            return Some(KeyAction::Dispatch(Intent::Retreat));
        }
        KeyCode::Char('w') => return Some(KeyAction::WriteDocument),
        KeyCode::Char(',') => {
            app.show_logs = !app.show_logs;
            app.active_pane = if app.show_logs {
                ActivePane::Log
            } else {
                ActivePane::Output
            };
        }
        KeyCode::Tab | KeyCode::BackTab => {
            if app.show_logs {
                app.active_pane = match app.active_pane {
                    ActivePane::Log => ActivePane::Output,
                    ActivePane::Output => ActivePane::Log,
                };
            }
        }
        KeyCode::Up | KeyCode::Char('k') => scroll(app, 3, true),
        KeyCode::Down | KeyCode::Char('j') => scroll(app, 3, false),
        KeyCode::PageUp => scroll(app, 20, true),
        KeyCode::PageDown => scroll(app, 20, false),
        KeyCode::End => match app.active_pane {
            ActivePane::Log => app.log_scroll = 0,
            ActivePane::Output => app.output_scroll = 0,
        },
        _ => {}
    }
    None
}

/// Scroll the active pane. The log counts from the bottom, the output
/// from the top, so "up" means opposite things for the two offsets.
fn scroll(app: &mut App, lines: usize, up: bool) {
    match (app.active_pane, up) {
        (ActivePane::Log, true) => app.log_scroll = app.log_scroll.saturating_add(lines),
        (ActivePane::Log, false) => app.log_scroll = app.log_scroll.saturating_sub(lines),
        (ActivePane::Output, true) => app.output_scroll = app.output_scroll.saturating_sub(lines),
        (ActivePane::Output, false) => {
            app.output_scroll = app.output_scroll.saturating_add(lines)
        }
    }
}

fn handle_text_key(key: KeyEvent, app: &mut App) -> Option<KeyAction> {
    match key.code {
        KeyCode::Enter => {
            let text = app.input_buffer.trim().to_string();
            if text.is_empty() {
                app.status_message = Some("Nothing entered.".into());
                return None;
            }
            let intent = match app.input_mode {
                InputMode::EditUseCase => Intent::SetInput(text),
                _ => Intent::GiveFeedback(text),
            };
            app.reset_input();
            app.output_scroll = 0;
            Some(KeyAction::Dispatch(intent))
        }
        KeyCode::Esc => {
            app.reset_input();
            app.status_message = Some("Input cancelled.".into());
            None
        }
        KeyCode::Backspace => {
            app.input_buffer.pop();
            None
        }
        KeyCode::Char(c) => {
            app.input_buffer.push(c);
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn state_in(pipeline: PipelineState) -> Arc<Mutex<UiState>> {
        let state = Arc::new(Mutex::new(UiState::new("m")));
        state.lock().unwrap().state = pipeline;
        state
    }

    fn type_text(app: &mut App, state: &Arc<Mutex<UiState>>, text: &str) {
        for c in text.chars() {
            assert_eq!(handle_key_event(press(KeyCode::Char(c)), app, state), None);
        }
    }

    #[test]
    fn edit_use_case_submits_set_input() {
        let state = state_in(PipelineState::Idle);
        let mut app = App::new();
        handle_key_event(press(KeyCode::Char('e')), &mut app, &state);
        assert_eq!(app.input_mode, InputMode::EditUseCase);
        type_text(&mut app, &state, "A Car has an owner.");
        let action = handle_key_event(press(KeyCode::Enter), &mut app, &state);
        assert_eq!(
            action,
            Some(KeyAction::Dispatch(Intent::SetInput("A Car has an owner.".into())))
        );
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.input_buffer.is_empty());
    }

    #[test]
    fn edit_is_refused_outside_idle() {
        let state = state_in(PipelineState::EntitiesReady);
        let mut app = App::new();
        handle_key_event(press(KeyCode::Char('e')), &mut app, &state);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.status_message.is_some());
    }

    #[test]
    fn feedback_mode_submits_note() {
        let state = state_in(PipelineState::PropertiesReady);
        let mut app = App::new();
        handle_key_event(press(KeyCode::Char('f')), &mut app, &state);
        assert_eq!(app.input_mode, InputMode::Feedback);
        type_text(&mut app, &state, "add vin");
        let action = handle_key_event(press(KeyCode::Enter), &mut app, &state);
        assert_eq!(
            action,
            Some(KeyAction::Dispatch(Intent::GiveFeedback("add vin".into())))
        );
    }

    #[test]
    fn escape_cancels_text_entry() {
        let state = state_in(PipelineState::DocumentReady);
        let mut app = App::new();
        handle_key_event(press(KeyCode::Char('f')), &mut app, &state);
        type_text(&mut app, &state, "x");
        assert_eq!(handle_key_event(press(KeyCode::Esc), &mut app, &state), None);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.input_buffer.is_empty());
    }

    #[test]
    fn navigation_keys_map_to_intents() {
        let state = state_in(PipelineState::EntitiesReady);
        let mut app = App::new();
        assert_eq!(
            handle_key_event(press(KeyCode::Char('n')), &mut app, &state),
            Some(KeyAction::Dispatch(Intent::Advance))
        );
        assert_eq!(
            handle_key_event(press(KeyCode::Char('b')), &mut app, &state),
            Some(KeyAction::Dispatch(Intent::Retreat))
        );
        assert_eq!(
            handle_key_event(press(KeyCode::Char('w')), &mut app, &state),
            Some(KeyAction::WriteDocument)
        );
    }

    #[test]
    fn dispatch_keys_are_ignored_while_busy() {
        let state = state_in(PipelineState::AwaitingProperties);
        state.lock().unwrap().busy = true;
        let mut app = App::new();
        assert_eq!(handle_key_event(press(KeyCode::Char('n')), &mut app, &state), None);
        assert_eq!(handle_key_event(press(KeyCode::Char('f')), &mut app, &state), None);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.status_message.is_some());
    }

    #[test]
    fn ctrl_c_quits_from_any_mode() {
        let state = state_in(PipelineState::Idle);
        let mut app = App::new();
        app.input_mode = InputMode::Feedback;
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        handle_key_event(key, &mut app, &state);
        assert!(app.should_quit);
    }

    #[test]
    fn logs_toggle_moves_focus() {
        let state = state_in(PipelineState::Idle);
        let mut app = App::new();
        handle_key_event(press(KeyCode::Char(',')), &mut app, &state);
        assert!(app.show_logs);
        assert_eq!(app.active_pane, ActivePane::Log);
        handle_key_event(press(KeyCode::Up), &mut app, &state);
        assert_eq!(app.log_scroll, 3);
        handle_key_event(press(KeyCode::Tab), &mut app, &state);
        assert_eq!(app.active_pane, ActivePane::Output);
    }
}
