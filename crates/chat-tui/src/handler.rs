use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, FocusPane};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => {
            if app.alert.is_none() && app.focus == FocusPane::Input {
                app.insert_str(&text.replace("\r\n", "\n"));
            }
        }
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // The alert blocks everything until dismissed
    if app.alert.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            app.dismiss_alert();
        }
        return;
    }

    let toggle_theme = key.code == KeyCode::F(2)
        || (key.code == KeyCode::Char('t') && key.modifiers.contains(KeyModifiers::CONTROL));
    if toggle_theme {
        app.toggle_theme();
        return;
    }

    match key.code {
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Input => FocusPane::Log,
                FocusPane::Log => FocusPane::Input,
            };
        }
        _ => match app.focus {
            FocusPane::Input => handle_input_key(app, key),
            FocusPane::Log => handle_log_key(app, key),
        },
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            // Shift+Enter needs keyboard enhancement; Alt+Enter works everywhere
            if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) {
                app.insert_char('\n');
            } else if app.input_enabled() {
                app.submit();
            }
        }
        KeyCode::Esc => {
            app.focus = FocusPane::Log;
        }
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            app.insert_char(c);
        }
        _ => {}
    }
}

fn handle_log_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::Char('g') | KeyCode::Home => app.scroll_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Esc => app.focus = FocusPane::Input,
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let hit = |area: Option<Rect>| area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown if hit(app.chat_area) => app.scroll_down(3),
        MouseEventKind::ScrollUp if hit(app.chat_area) => app.scroll_up(3),
        MouseEventKind::Down(MouseButton::Left) => {
            if app.alert.is_some() {
                return;
            }
            if hit(app.theme_toggle_area) {
                app.toggle_theme();
            } else if hit(app.input_area) {
                app.focus = FocusPane::Input;
            } else if hit(app.chat_area) {
                app.focus = FocusPane::Log;
            }
        }
        _ => {}
    }
}
