use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};
use chat_core::{BlockKind, ChatRole, InlineStyle, Theme};
use crate::app::{App, FocusPane};

/// Colours for one theme.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub bg: Color,
    pub fg: Color,
    pub muted: Color,
    pub header_bg: Color,
    pub border: Color,
    pub border_focus: Color,
    pub user: Color,
    pub assistant: Color,
    pub error: Color,
    pub notice: Color,
    pub heading: Color,
    pub link: Color,
    pub code_fg: Color,
    pub code_bg: Color,
    pub quote: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                bg: Color::Rgb(250, 250, 250),
                fg: Color::Rgb(30, 30, 30),
                muted: Color::Rgb(120, 120, 120),
                header_bg: Color::Rgb(225, 228, 232),
                border: Color::Rgb(190, 190, 190),
                border_focus: Color::Rgb(0, 110, 200),
                user: Color::Rgb(0, 95, 175),
                assistant: Color::Rgb(135, 80, 0),
                error: Color::Rgb(200, 0, 0),
                notice: Color::Rgb(210, 110, 0),
                heading: Color::Rgb(110, 40, 150),
                link: Color::Rgb(0, 100, 200),
                code_fg: Color::Rgb(40, 40, 40),
                code_bg: Color::Rgb(232, 232, 232),
                quote: Color::Rgb(140, 140, 140),
            },
            Theme::Dark => Self {
                bg: Color::Rgb(24, 24, 27),
                fg: Color::Rgb(228, 228, 231),
                muted: Color::Rgb(140, 140, 150),
                header_bg: Color::Rgb(45, 45, 52),
                border: Color::Rgb(70, 70, 80),
                border_focus: Color::Cyan,
                user: Color::Cyan,
                assistant: Color::Yellow,
                error: Color::Rgb(255, 85, 85),
                notice: Color::Rgb(255, 165, 0),
                heading: Color::Rgb(200, 150, 255),
                link: Color::Rgb(110, 170, 255),
                code_fg: Color::Rgb(220, 220, 220),
                code_bg: Color::Rgb(50, 50, 58),
                quote: Color::Rgb(120, 120, 130),
            },
        }
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let palette = Palette::for_theme(app.current_theme());

    frame.render_widget(
        Block::default().style(Style::default().bg(palette.bg).fg(palette.fg)),
        area,
    );

    // Input grows with its content, up to five lines
    let input_lines = app.input.split('\n').count().clamp(1, 5) as u16;

    // Main layout: header, chat log, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(input_lines + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area, &palette);
    render_chat(app, frame, chat_area, &palette);
    render_input(app, frame, input_area, &palette);
    render_footer(app, frame, footer_area, &palette);

    if app.alert.is_some() {
        render_alert(app, frame, area, &palette);
    }
}

fn render_header(app: &mut App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let icon = app.current_theme().toggle_icon();
    // Emoji are two cells wide; pad one on each side
    let icon_width = 4;

    let [title_area, toggle_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(icon_width),
    ])
    .areas(area);

    let title = Line::from(vec![
        Span::styled(" prompt-chat ", Style::default().fg(palette.user).bold()),
        Span::styled(app.client.base_url().to_string(), Style::default().fg(palette.muted)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(palette.muted),
        ),
    ]);

    let style = Style::default().bg(palette.header_bg);
    frame.render_widget(Paragraph::new(title).style(style), title_area);
    frame.render_widget(Paragraph::new(format!(" {} ", icon)).style(style), toggle_area);

    app.theme_toggle_area = Some(toggle_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect, palette: &Palette) {
    app.chat_area = Some(area);

    let focused = app.focus == FocusPane::Log;
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { palette.border_focus } else { palette.border }))
        .title(" Chat ");

    let inner_width = area.width.saturating_sub(2);
    app.chat_height = area.height.saturating_sub(2);

    let lines = if app.session.log().is_empty() && !app.is_loading() {
        vec![Line::from(Span::styled(
            "Type a prompt below and press Enter.",
            Style::default().fg(palette.muted),
        ))]
    } else {
        chat_lines(app, palette)
    };

    let paragraph = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    app.total_chat_lines = wrapped_height(&paragraph, inner_width);

    // Deferred scroll: resolved here, once the wrapped height is known
    if app.session.log_mut().take_scroll_request() {
        app.chat_scroll = app.total_chat_lines.saturating_sub(app.chat_height);
    } else {
        app.chat_scroll = app
            .chat_scroll
            .min(app.total_chat_lines.saturating_sub(app.chat_height));
    }

    let paragraph = paragraph.block(chat_block).scroll((app.chat_scroll, 0));

    frame.render_widget(paragraph, area);

    if app.total_chat_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state = ScrollbarState::new(app.total_chat_lines as usize)
            .position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn chat_lines(app: &App, palette: &Palette) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for entry in app.session.log().entries() {
        let (label, base) = match entry.message.role {
            ChatRole::User => (
                Some(Span::styled("You:", Style::default().fg(palette.user).add_modifier(Modifier::BOLD))),
                Style::default().fg(palette.fg),
            ),
            ChatRole::Assistant => (
                Some(Span::styled("AI:", Style::default().fg(palette.assistant).add_modifier(Modifier::BOLD))),
                Style::default().fg(palette.fg),
            ),
            ChatRole::Error => (None, Style::default().fg(palette.error)),
        };

        if let Some(label) = label {
            lines.push(Line::from(label));
        }
        lines.extend(blocks_to_lines(&entry.blocks, base, palette));
        lines.push(Line::default());
    }

    if app.is_loading() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(palette.assistant).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(palette.muted).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

/// Lay rendered blocks out as terminal lines.
pub fn blocks_to_lines(blocks: &[chat_core::Block], base: Style, palette: &Palette) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        // Keep list items and table rows together; separate everything else
        let tight = matches!(
            (i.checked_sub(1).map(|p| &blocks[p].kind), &block.kind),
            (Some(BlockKind::ListItem { .. }), BlockKind::ListItem { .. })
                | (Some(BlockKind::TableRow), BlockKind::TableRow)
        );
        if i > 0 && !tight && block.kind != BlockKind::Suffix {
            lines.push(Line::default());
        }

        let quote_prefix = "│ ".repeat(block.quote_depth);

        match &block.kind {
            BlockKind::Rule => {
                lines.push(Line::from(vec![
                    Span::styled(quote_prefix.clone(), Style::default().fg(palette.quote)),
                    Span::styled("─".repeat(24), Style::default().fg(palette.muted)),
                ]));
                continue;
            }
            BlockKind::CodeBlock { lang: Some(lang) } => {
                lines.push(Line::from(vec![
                    Span::styled(quote_prefix.clone(), Style::default().fg(palette.quote)),
                    Span::styled(format!("─ {} ", lang), Style::default().fg(palette.muted)),
                ]));
            }
            _ => {}
        }

        let block_style = match &block.kind {
            BlockKind::Heading(level) => {
                let style = base.fg(palette.heading).add_modifier(Modifier::BOLD);
                if *level == 1 { style.add_modifier(Modifier::UNDERLINED) } else { style }
            }
            BlockKind::Notice => base.fg(palette.notice).add_modifier(Modifier::ITALIC),
            BlockKind::CodeBlock { .. } => base.fg(palette.code_fg).bg(palette.code_bg),
            _ => base,
        };

        for (line_idx, inlines) in block.lines.iter().enumerate() {
            let mut spans: Vec<Span<'static>> = Vec::new();
            if !quote_prefix.is_empty() {
                spans.push(Span::styled(quote_prefix.clone(), Style::default().fg(palette.quote)));
            }

            match &block.kind {
                BlockKind::ListItem { depth, marker } => {
                    let indent = "  ".repeat(depth.saturating_sub(1));
                    if line_idx == 0 {
                        spans.push(Span::raw(indent));
                        spans.push(Span::styled(marker.clone(), base.fg(palette.assistant)));
                    } else {
                        spans.push(Span::raw(format!("{}{}", indent, " ".repeat(marker.chars().count()))));
                    }
                }
                BlockKind::CodeBlock { .. } => spans.push(Span::styled("  ", block_style)),
                _ => {}
            }

            for inline in inlines {
                spans.push(Span::styled(inline.text.clone(), inline_style(block_style, inline.style, palette)));
            }
            lines.push(Line::from(spans));
        }
    }

    lines
}

fn inline_style(base: Style, style: InlineStyle, palette: &Palette) -> Style {
    let mut out = base;
    if style.bold {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.italic {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.strikethrough {
        out = out.add_modifier(Modifier::CROSSED_OUT);
    }
    if style.code {
        out = out.fg(palette.code_fg).bg(palette.code_bg);
    }
    if style.link {
        out = out.fg(palette.link).add_modifier(Modifier::UNDERLINED);
    }
    if style.duration {
        out = out.fg(palette.muted).add_modifier(Modifier::ITALIC);
    }
    out
}

/// Rows a block-less paragraph occupies at `width`, using the widget's own wrapping.
pub fn wrapped_height(paragraph: &Paragraph, width: u16) -> u16 {
    paragraph.line_count(width.max(1)).min(u16::MAX as usize) as u16
}

fn render_input(app: &mut App, frame: &mut Frame, area: Rect, palette: &Palette) {
    app.input_area = Some(area);

    let enabled = app.input_enabled();
    let focused = app.focus == FocusPane::Input && app.alert.is_none();

    let border_color = if !enabled {
        palette.muted
    } else if focused {
        palette.border_focus
    } else {
        palette.border
    };

    let title = if enabled { " Prompt " } else { " Prompt (waiting for reply) " };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let text_style = if enabled {
        Style::default().fg(palette.fg)
    } else {
        Style::default().fg(palette.muted).add_modifier(Modifier::DIM)
    };

    // Keep the cursor line visible when the input is taller than the box
    let visible_rows = area.height.saturating_sub(2).max(1);
    let before_cursor: String = app.input.chars().take(app.input_cursor).collect();
    let cursor_row = before_cursor.matches('\n').count() as u16;
    let cursor_col = before_cursor
        .rsplit('\n')
        .next()
        .map(|s| Line::raw(s.to_string()).width())
        .unwrap_or(0) as u16;
    let scroll = cursor_row.saturating_sub(visible_rows - 1);

    let input = Paragraph::new(app.input.as_str())
        .style(text_style)
        .block(input_block)
        .scroll((scroll, 0));

    frame.render_widget(input, area);

    if enabled && focused {
        frame.set_cursor_position((
            area.x + 1 + cursor_col.min(area.width.saturating_sub(3)),
            area.y + 1 + cursor_row - scroll,
        ));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let key_style = Style::default().bg(palette.header_bg).fg(palette.fg).bold();
    let label_style = Style::default().fg(palette.muted);

    let mut hints = match app.focus {
        FocusPane::Input => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Shift/Alt+Enter ", key_style),
            Span::styled(" newline ", label_style),
        ],
        FocusPane::Log => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" g/G ", key_style),
            Span::styled(" top/bottom ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };
    hints.extend(vec![
        Span::styled(" Tab ", key_style),
        Span::styled(" focus ", label_style),
        Span::styled(" Ctrl+T ", key_style),
        Span::styled(" theme ", label_style),
        Span::styled(" Ctrl+C ", key_style),
        Span::styled(" exit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_alert(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let Some(message) = app.alert.as_deref() else {
        return;
    };

    let [popup_area] = Layout::horizontal([Constraint::Length(44)])
        .flex(Flex::Center)
        .areas(area);
    let [popup_area] = Layout::vertical([Constraint::Length(5)])
        .flex(Flex::Center)
        .areas(popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.notice))
        .title(" Notice ")
        .style(Style::default().bg(palette.header_bg).fg(palette.fg));

    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::default(),
        Line::from(Span::styled("Enter/Esc to close", Style::default().fg(palette.muted))),
    ]);

    frame.render_widget(Clear, popup_area);
    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
        popup_area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::render::render_message;
    use chat_core::{GenerateClient, ThemeManager};
    use ratatui::{backend::TestBackend, Terminal};

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_wrapped_height_follows_word_wrap() {
        let paragraph = Paragraph::new(vec![Line::raw("abcdefghij"), Line::default(), Line::raw("abc")])
            .wrap(Wrap { trim: false });
        assert_eq!(wrapped_height(&paragraph, 4), 3 + 1 + 1);
        assert_eq!(wrapped_height(&paragraph, 10), 3);

        // Breaking at spaces needs a row more than splitting by width alone
        let paragraph = Paragraph::new(Line::raw("aaaa bbbb cc")).wrap(Wrap { trim: false });
        assert_eq!(wrapped_height(&paragraph, 6), 3);
    }

    #[test]
    fn test_list_items_are_indented_and_tight() {
        let palette = Palette::for_theme(Theme::Dark);
        let blocks = render_message(ChatRole::Assistant, "- a\n- b\n  - c", None);
        let lines = blocks_to_lines(&blocks, Style::default(), &palette);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["• a", "• b", "  • c"]);
    }

    #[test]
    fn test_code_block_has_language_header() {
        let palette = Palette::for_theme(Theme::Light);
        let blocks = render_message(ChatRole::Assistant, "```py\nprint(1)\n```", Some(0.4));
        let texts: Vec<String> = blocks_to_lines(&blocks, Style::default(), &palette)
            .iter()
            .map(line_text)
            .collect();
        assert_eq!(texts, vec!["─ py ", "  print(1)", " (0.4초)"]);
    }

    #[test]
    fn test_render_draws_log_and_pins_to_bottom() {
        let mut app = App::new(
            GenerateClient::new("http://127.0.0.1:9"),
            ThemeManager::initialize(None, Some(true)),
        );
        for i in 0..30 {
            app.session.log_mut().append(ChatRole::User, format!("message {i}"), None);
        }

        let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert!(app.chat_scroll > 0);
        assert_eq!(app.chat_scroll, app.total_chat_lines - app.chat_height);
        assert!(app.theme_toggle_area.is_some());

        // Scrolling up sticks until the next append
        app.scroll_up(5);
        let scrolled = app.chat_scroll;
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert_eq!(app.chat_scroll, scrolled);

        app.session.log_mut().append(ChatRole::Error, "Error: boom", None);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert_eq!(app.chat_scroll, app.total_chat_lines - app.chat_height);
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_word_wrapped_reply_is_visible_after_append() {
        let mut app = App::new(
            GenerateClient::new("http://127.0.0.1:9"),
            ThemeManager::initialize(None, None),
        );
        for _ in 0..5 {
            app.session.log_mut().append(
                ChatRole::Assistant,
                "aaaaaaaaaaaa bbbbbbbbbbbb cccccccccccc dddddddddddd",
                None,
            );
        }
        app.session.log_mut().append(ChatRole::Assistant, "final reply LASTWORD", None);

        let mut terminal = Terminal::new(TestBackend::new(24, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert_eq!(app.chat_scroll, app.total_chat_lines - app.chat_height);
        assert!(screen_text(&terminal).contains("LASTWORD"));
    }

    #[test]
    fn test_alert_popup_renders() {
        let mut app = App::new(
            GenerateClient::new("http://127.0.0.1:9"),
            ThemeManager::initialize(None, None),
        );
        app.alert = Some("Please enter a prompt.".to_string());

        let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let buffer = terminal.backend().buffer();
        let screen: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(screen.contains("Please enter a prompt."));
    }
}
