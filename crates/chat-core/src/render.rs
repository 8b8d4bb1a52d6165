//! Message rendering: chat message text -> framework-neutral styled blocks.
//!
//! Assistant replies go through pulldown-cmark. Sanitization happens during
//! conversion: raw HTML is dropped, link/image targets are never kept, and
//! control characters are stripped from every text run so nothing the server
//! sends can reach the terminal as an escape sequence. User and error text is
//! never interpreted.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use thiserror::Error;
use tracing::warn;

use crate::state::ChatRole;

/// Deepest quote/list/inline-style nesting the renderer will follow.
pub const MAX_NESTING: usize = 32;

pub const RENDER_ERROR_NOTICE: &str = "(markdown rendering error)";

const SECONDS_MARKER: &str = "초";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("markdown nesting exceeds {limit} levels")]
    TooDeep { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub link: bool,
    pub duration: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inline {
    pub text: String,
    pub style: InlineStyle,
}

impl Inline {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: InlineStyle::default(),
        }
    }

    pub fn styled(text: impl Into<String>, style: InlineStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    CodeBlock { lang: Option<String> },
    ListItem { depth: usize, marker: String },
    TableRow,
    Rule,
    /// Uninterpreted text (user and error messages, render fallback).
    Plain,
    /// Visible notice that rendering failed.
    Notice,
    /// Response duration when it could not join the last paragraph.
    Suffix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub quote_depth: usize,
    pub lines: Vec<Vec<Inline>>,
}

impl Block {
    fn new(kind: BlockKind, quote_depth: usize) -> Self {
        Self {
            kind,
            quote_depth,
            lines: vec![Vec::new()],
        }
    }

    fn single(kind: BlockKind, text: impl Into<String>, style: InlineStyle) -> Self {
        Self {
            kind,
            quote_depth: 0,
            lines: vec![vec![Inline::styled(text, style)]],
        }
    }

    pub fn plain(text: &str) -> Self {
        let mut lines: Vec<Vec<Inline>> = sanitize_text(text)
            .lines()
            .map(|line| vec![Inline::plain(line)])
            .collect();
        if lines.is_empty() {
            lines.push(Vec::new());
        }
        Self {
            kind: BlockKind::Plain,
            quote_depth: 0,
            lines,
        }
    }

    fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.iter().all(|i| i.text.is_empty()))
    }

    /// Visible text, one `\n` per line break.
    pub fn plain_text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.iter().map(|i| i.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Render a message the way it is inserted into the log.
pub fn render_message(role: ChatRole, content: &str, duration_secs: Option<f64>) -> Vec<Block> {
    match role {
        ChatRole::User | ChatRole::Error => vec![Block::plain(content)],
        ChatRole::Assistant => {
            let mut blocks = render_assistant(content, markdown_to_blocks);
            if let Some(duration) = duration_secs {
                attach_duration(&mut blocks, duration);
            }
            blocks
        }
    }
}

/// Convert with `convert`, falling back to plain text plus a notice on failure.
pub fn render_assistant(
    content: &str,
    convert: impl FnOnce(&str) -> Result<Vec<Block>, RenderError>,
) -> Vec<Block> {
    match convert(content) {
        Ok(blocks) => blocks,
        Err(e) => {
            warn!(error = %e, "markdown rendering failed; showing plain text");
            vec![
                Block::plain(content),
                Block::single(BlockKind::Notice, RENDER_ERROR_NOTICE, InlineStyle::default()),
            ]
        }
    }
}

pub fn format_duration_suffix(duration_secs: f64) -> String {
    format!(" ({}{})", duration_secs, SECONDS_MARKER)
}

/// Join the duration to the last paragraph, or add it as its own block.
pub fn attach_duration(blocks: &mut Vec<Block>, duration_secs: f64) {
    let style = InlineStyle {
        duration: true,
        ..InlineStyle::default()
    };
    let suffix = format_duration_suffix(duration_secs);

    if let Some(last) = blocks.last_mut() {
        if last.kind == BlockKind::Paragraph {
            if let Some(line) = last.lines.last_mut() {
                line.push(Inline::styled(suffix, style));
                return;
            }
        }
    }

    blocks.push(Block::single(BlockKind::Suffix, suffix, style));
}

/// Strip control characters; tabs become four spaces.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push('\n'),
            '\t' => out.push_str("    "),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Markdown -> sanitized blocks.
pub fn markdown_to_blocks(md: &str) -> Result<Vec<Block>, RenderError> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(md, options) {
        builder.event(event)?;
    }
    Ok(builder.finish())
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
    style_stack: Vec<InlineStyle>,
    // Next ordinal per open list; None for bullet lists.
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    in_code_block: bool,
    suppress_text: bool,
}

impl BlockBuilder {
    fn event(&mut self, event: Event<'_>) -> Result<(), RenderError> {
        match event {
            // ── Block structure ──────────────────────────────────
            Event::Start(Tag::Paragraph) => {
                if !self.in_list_item() {
                    self.open(BlockKind::Paragraph);
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if self.in_list_item() {
                    self.new_line();
                } else {
                    self.close();
                }
            }
            Event::Start(Tag::Heading { level, .. }) => {
                self.open(BlockKind::Heading(heading_level(level)));
            }
            Event::End(TagEnd::Heading(_)) => self.close(),

            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(sanitize_text(&lang)),
                    _ => None,
                };
                self.open(BlockKind::CodeBlock { lang });
                self.in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code_block = false;
                self.close();
            }

            Event::Start(Tag::List(start)) => {
                self.close();
                self.lists.push(start);
                self.check_depth()?;
            }
            Event::End(TagEnd::List(_)) => {
                self.close();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                let depth = self.lists.len();
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.open(BlockKind::ListItem { depth, marker });
            }
            Event::End(TagEnd::Item) => self.close(),

            Event::Start(Tag::BlockQuote) => {
                self.close();
                self.quote_depth += 1;
                self.check_depth()?;
            }
            Event::End(TagEnd::BlockQuote) => {
                self.close();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }

            Event::Rule => {
                self.close();
                self.blocks.push(Block::new(BlockKind::Rule, self.quote_depth));
            }

            // ── Tables ───────────────────────────────────────────
            Event::Start(Tag::Table(_)) => self.close(),
            Event::End(TagEnd::Table) => self.close(),
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => {
                self.open(BlockKind::TableRow);
            }
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => self.close(),
            Event::Start(Tag::TableCell) => {
                let row_started = self
                    .current
                    .as_ref()
                    .and_then(|b| b.lines.last())
                    .is_some_and(|line| !line.is_empty());
                if row_started {
                    self.push_text(" │ ".to_string(), InlineStyle::default());
                }
            }

            // ── Inline styles ────────────────────────────────────
            Event::Start(Tag::Strong) => self.push_style(|s| s.bold = true)?,
            Event::Start(Tag::Emphasis) => self.push_style(|s| s.italic = true)?,
            Event::Start(Tag::Strikethrough) => self.push_style(|s| s.strikethrough = true)?,
            // Destination is discarded; only the visible text survives.
            Event::Start(Tag::Link { .. }) => self.push_style(|s| s.link = true)?,
            Event::Start(Tag::Image { .. }) => {
                self.push_text("[image: ".to_string(), self.style());
                self.push_style(|s| s.italic = true)?;
            }
            Event::End(TagEnd::Strong)
            | Event::End(TagEnd::Emphasis)
            | Event::End(TagEnd::Strikethrough)
            | Event::End(TagEnd::Link) => {
                self.style_stack.pop();
            }
            Event::End(TagEnd::Image) => {
                self.style_stack.pop();
                self.push_text("]".to_string(), self.style());
            }

            // ── Text ─────────────────────────────────────────────
            Event::Text(_) if self.suppress_text => {}
            Event::Text(text) => {
                let text = sanitize_text(&text);
                if self.in_code_block {
                    self.push_code(&text);
                } else {
                    self.push_text(text, self.style());
                }
            }
            Event::Code(code) => {
                let style = InlineStyle {
                    code: true,
                    ..self.style()
                };
                self.push_text(sanitize_text(&code), style);
            }
            Event::SoftBreak => self.push_text(" ".to_string(), self.style()),
            Event::HardBreak => self.new_line(),
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_text(marker.to_string(), InlineStyle::default());
            }

            // Raw HTML never reaches the screen, nor does inline script/style content.
            Event::InlineHtml(html) => {
                let tag = html.trim_start().to_ascii_lowercase();
                if tag.starts_with("<script") || tag.starts_with("<style") {
                    self.suppress_text = true;
                } else if tag.starts_with("</script") || tag.starts_with("</style") {
                    self.suppress_text = false;
                }
            }
            Event::Html(_) => {}

            _ => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Block> {
        self.close();
        self.blocks
    }

    fn in_list_item(&self) -> bool {
        matches!(
            self.current.as_ref().map(|b| &b.kind),
            Some(BlockKind::ListItem { .. })
        )
    }

    fn style(&self) -> InlineStyle {
        self.style_stack.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, f: impl FnOnce(&mut InlineStyle)) -> Result<(), RenderError> {
        let mut style = self.style();
        f(&mut style);
        self.style_stack.push(style);
        if self.style_stack.len() > MAX_NESTING {
            return Err(RenderError::TooDeep { limit: MAX_NESTING });
        }
        Ok(())
    }

    fn check_depth(&self) -> Result<(), RenderError> {
        if self.quote_depth + self.lists.len() > MAX_NESTING {
            return Err(RenderError::TooDeep { limit: MAX_NESTING });
        }
        Ok(())
    }

    fn open(&mut self, kind: BlockKind) {
        self.close();
        self.current = Some(Block::new(kind, self.quote_depth));
    }

    fn close(&mut self) {
        let Some(mut block) = self.current.take() else {
            return;
        };
        while block.lines.len() > 1 && block.lines.last().is_some_and(|l| l.is_empty()) {
            block.lines.pop();
        }
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    fn new_line(&mut self) {
        if let Some(block) = self.current.as_mut() {
            block.lines.push(Vec::new());
        }
    }

    fn push_text(&mut self, text: String, style: InlineStyle) {
        if text.is_empty() {
            return;
        }
        let quote_depth = self.quote_depth;
        let block = self
            .current
            .get_or_insert_with(|| Block::new(BlockKind::Paragraph, quote_depth));
        if let Some(line) = block.lines.last_mut() {
            line.push(Inline::styled(text, style));
        }
    }

    fn push_code(&mut self, text: &str) {
        let style = InlineStyle {
            code: true,
            ..InlineStyle::default()
        };
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.new_line();
            }
            self.push_text(part.to_string(), style);
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_text(blocks: &[Block]) -> String {
        blocks.iter().map(Block::plain_text).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_bold_is_styled() {
        let blocks = markdown_to_blocks("**hi**").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Paragraph);
        let inline = &blocks[0].lines[0][0];
        assert_eq!(inline.text, "hi");
        assert!(inline.style.bold);
    }

    #[test]
    fn test_user_text_is_not_interpreted() {
        let blocks = render_message(ChatRole::User, "**hello** <b>x</b>", None);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Plain);
        assert_eq!(blocks[0].plain_text(), "**hello** <b>x</b>");
        assert!(!blocks[0].lines[0][0].style.bold);
    }

    #[test]
    fn test_error_text_is_plain() {
        let blocks = render_message(ChatRole::Error, "Error: _boom_", Some(3.0));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].plain_text(), "Error: _boom_");
    }

    #[test]
    fn test_raw_html_is_dropped() {
        let blocks = render_message(ChatRole::Assistant, "<img src=x onerror=alert(1)>", None);
        let text = all_text(&blocks);
        assert!(!text.contains("onerror"));
        assert!(!text.contains("<img"));

        let blocks = markdown_to_blocks("before <script>alert(1)</script> after").unwrap();
        let text = all_text(&blocks);
        assert!(!text.contains("<script>"));
        assert!(!text.contains("alert"));
        assert!(text.contains("before"));
        assert!(text.contains("after"));
    }

    #[test]
    fn test_link_keeps_text_only() {
        let blocks = markdown_to_blocks("see [docs](javascript:alert(1))").unwrap();
        let text = all_text(&blocks);
        assert_eq!(text, "see docs");
        assert!(blocks[0].lines[0][1].style.link);
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let blocks = markdown_to_blocks("red \u{1b}[31mtext\u{7}").unwrap();
        assert_eq!(all_text(&blocks), "red [31mtext");

        let blocks = render_message(ChatRole::User, "a\u{1b}b\tc", None);
        assert_eq!(blocks[0].plain_text(), "ab    c");
    }

    #[test]
    fn test_code_block_lines() {
        let blocks = markdown_to_blocks("```rust\nfn main() {}\n\nlet x = 1;\n```").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].kind,
            BlockKind::CodeBlock { lang: Some("rust".to_string()) }
        );
        assert_eq!(blocks[0].plain_text(), "fn main() {}\n\nlet x = 1;");
    }

    #[test]
    fn test_lists_and_headings() {
        let blocks = markdown_to_blocks("# Title\n\n1. one\n2. two\n\n- a\n  - b\n").unwrap();
        assert_eq!(blocks[0].kind, BlockKind::Heading(1));
        assert_eq!(
            blocks[1].kind,
            BlockKind::ListItem { depth: 1, marker: "1. ".to_string() }
        );
        assert_eq!(
            blocks[2].kind,
            BlockKind::ListItem { depth: 1, marker: "2. ".to_string() }
        );
        assert_eq!(blocks[2].plain_text(), "two");
        assert!(blocks
            .iter()
            .any(|b| b.kind == BlockKind::ListItem { depth: 2, marker: "• ".to_string() }
                && b.plain_text() == "b"));
    }

    #[test]
    fn test_quote_depth() {
        let blocks = markdown_to_blocks("> quoted\n>> deeper").unwrap();
        assert_eq!(blocks[0].quote_depth, 1);
        assert_eq!(blocks.last().unwrap().quote_depth, 2);
    }

    #[test]
    fn test_duration_joins_last_paragraph() {
        let blocks = render_message(ChatRole::Assistant, "**hi**", Some(1.2));
        assert_eq!(blocks.len(), 1);
        let line = &blocks[0].lines[0];
        assert_eq!(line[0].text, "hi");
        assert!(line[0].style.bold);
        assert_eq!(line[1].text, " (1.2초)");
        assert!(line[1].style.duration);
    }

    #[test]
    fn test_duration_after_code_block_is_separate() {
        let blocks = render_message(ChatRole::Assistant, "```\ncode\n```", Some(2.0));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].kind, BlockKind::Suffix);
        assert_eq!(blocks[1].plain_text(), " (2초)");
    }

    #[test]
    fn test_duration_on_empty_reply() {
        let blocks = render_message(ChatRole::Assistant, "", Some(0.5));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Suffix);
    }

    #[test]
    fn test_too_deep_falls_back_to_plain_text() {
        let content = format!("{} deep", ">".repeat(MAX_NESTING + 8));
        assert_eq!(
            markdown_to_blocks(&content),
            Err(RenderError::TooDeep { limit: MAX_NESTING })
        );

        let blocks = render_message(ChatRole::Assistant, &content, Some(1.0));
        assert_eq!(blocks[0].kind, BlockKind::Plain);
        assert_eq!(blocks[0].plain_text(), content);
        assert_eq!(blocks[1].kind, BlockKind::Notice);
        assert_eq!(blocks[1].plain_text(), RENDER_ERROR_NOTICE);
        assert_eq!(blocks[2].kind, BlockKind::Suffix);
    }

    #[test]
    fn test_render_assistant_uses_converter_error() {
        let blocks = render_assistant("text", |_| Err(RenderError::TooDeep { limit: 1 }));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].plain_text(), "text");
    }

    #[test]
    fn test_table_row() {
        let blocks = markdown_to_blocks("| a | b |\n|---|---|\n| 1 | 2 |").unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.kind == BlockKind::TableRow));
        assert_eq!(blocks[1].plain_text(), "1 │ 2");
    }
}
