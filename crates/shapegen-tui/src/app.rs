//! TUI-local state (not shared with the session).

/// Input mode for the TUI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InputMode {
    /// Single-key commands; arrow keys scroll.
    Normal,
    /// Editing the use case. Enter submits, Esc cancels.
    EditUseCase,
    /// Typing a feedback note for the current phase. Enter submits, Esc cancels.
    Feedback,
}

/// Which pane currently receives scroll input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ActivePane {
    Log,
    Output,
}

pub(crate) struct App {
    pub(crate) input_mode: InputMode,
    pub(crate) input_buffer: String,
    /// Which pane is focused for scrolling (toggled with Tab).
    pub(crate) active_pane: ActivePane,
    /// Whether the logs pane is visible (toggled with `,`).
    pub(crate) show_logs: bool,
    /// Offset from the bottom of the log (0 = follow tail).
    pub(crate) log_scroll: usize,
    /// Offset from the top of the phase output.
    pub(crate) output_scroll: usize,
    /// Shown in the input bar until the next key press.
    pub(crate) status_message: Option<String>,
    pub(crate) should_quit: bool,
}

impl App {
    pub(crate) fn new() -> Self {
        Self {
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            active_pane: ActivePane::Output,
            show_logs: false,
            log_scroll: 0,
            output_scroll: 0,
            status_message: None,
            should_quit: false,
        }
    }

    /// Leave text entry and discard the buffer.
    pub(crate) fn reset_input(&mut self) {
        self.input_buffer.clear();
        self.input_mode = InputMode::Normal;
    }
}
