//! UI-agnostic chat state
//!
//! The log is append-only. Each message is rendered once, when it is appended,
//! and never changes afterwards.

use serde::{Deserialize, Serialize};

use crate::render::{self, Block};

/// A chat message in the conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// The role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub message: ChatMessage,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<LogEntry>,
    // Set on every append; the view clears it once it has scrolled.
    scroll_to_bottom: bool,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: ChatRole, content: impl Into<String>, duration_secs: Option<f64>) -> &LogEntry {
        let content = content.into();
        let blocks = render::render_message(role, &content, duration_secs);
        self.entries.push(LogEntry {
            message: ChatMessage {
                role,
                content,
                duration_secs,
            },
            blocks,
        });
        self.scroll_to_bottom = true;
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.scroll_to_bottom = true;
    }

    /// Consume a pending scroll-to-bottom request.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_bottom)
    }
}
