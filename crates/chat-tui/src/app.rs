use chat_core::{ChatSession, GenerateClient, Generation, RequestError, SendRejected, Theme, ThemeManager};
use ratatui::layout::Rect;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Input,
    Log,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: FocusPane,
    pub session: ChatSession,
    pub theme: ThemeManager,
    pub client: GenerateClient,

    // Prompt input
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars

    // Blocking validation alert; other keys are ignored while it is shown
    pub alert: Option<String>,

    // In-flight request
    pub request_task: Option<JoinHandle<Result<Generation, RequestError>>>,

    // Chat log scrolling (updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub total_chat_lines: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub input_area: Option<Rect>,
    pub theme_toggle_area: Option<Rect>,
}

impl App {
    pub fn new(client: GenerateClient, theme: ThemeManager) -> Self {
        Self {
            should_quit: false,
            focus: FocusPane::Input,
            session: ChatSession::new(),
            theme,
            client,

            input: String::new(),
            input_cursor: 0,

            alert: None,

            request_task: None,

            chat_scroll: 0,
            chat_height: 0,
            total_chat_lines: 0,

            animation_frame: 0,

            chat_area: None,
            input_area: None,
            theme_toggle_area: None,
        }
    }

    pub fn current_theme(&self) -> Theme {
        self.theme.current()
    }

    /// Input and send are disabled while a request is in flight.
    pub fn input_enabled(&self) -> bool {
        !self.session.is_sending()
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_sending()
    }

    /// Send the current input, if the session accepts it.
    pub fn submit(&mut self) {
        match self.session.begin_send(&self.input) {
            Ok(prompt) => {
                self.input.clear();
                self.input_cursor = 0;
                self.animation_frame = 0;

                let client = self.client.clone();
                self.request_task = Some(tokio::spawn(async move {
                    client.generate(&prompt).await
                }));
            }
            Err(SendRejected::EmptyPrompt) => {
                self.alert = Some(SendRejected::EmptyPrompt.to_string());
            }
            Err(SendRejected::InFlight) => {
                debug!("send ignored; request already in flight");
            }
        }
    }

    /// Complete the request once its task has finished.
    pub async fn poll_request(&mut self) {
        let finished = self
            .request_task
            .as_ref()
            .is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }

        if let Some(task) = self.request_task.take() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RequestError::Aborted(e.to_string())),
            };
            self.finish_request(outcome);
        }
    }

    /// Runs once per request whatever the outcome.
    fn finish_request(&mut self, outcome: Result<Generation, RequestError>) {
        self.session.complete(outcome);
        self.focus = FocusPane::Input;
        self.session.log_mut().request_scroll_to_bottom();
    }

    pub fn toggle_theme(&mut self) {
        self.theme.toggle();
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
        self.focus = FocusPane::Input;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Scrolling
    fn max_scroll(&self) -> u16 {
        self.total_chat_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.session.log_mut().request_scroll_to_bottom();
    }

    // Input editing; every edit is a no-op while the input is disabled
    pub fn insert_char(&mut self, c: char) {
        if !self.input_enabled() {
            return;
        }
        let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert(byte_pos, c);
        self.input_cursor += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars().filter(|c| *c == '\n' || !c.is_control()) {
            self.insert_char(c);
        }
    }

    pub fn backspace(&mut self) {
        if !self.input_enabled() || self.input_cursor == 0 {
            return;
        }
        self.input_cursor -= 1;
        let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
        self.input.remove(byte_pos);
    }

    pub fn delete(&mut self) {
        if !self.input_enabled() {
            return;
        }
        let char_count = self.input.chars().count();
        if self.input_cursor < char_count {
            let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.input.chars().count();
        self.input_cursor = (self.input_cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
