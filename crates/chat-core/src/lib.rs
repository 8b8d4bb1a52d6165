pub mod client;
pub mod config;
pub mod render;
pub mod session;
pub mod state;
pub mod theme;

// Re-export main types for convenience
pub use client::{GenerateClient, Generation, RequestError};
pub use config::{Config, ConfigStore};
pub use render::{Block, BlockKind, Inline, InlineStyle, RenderError};
pub use session::{ChatSession, RequestState, SendRejected};
pub use state::{ChatLog, ChatMessage, ChatRole, LogEntry};
pub use theme::{ParseThemeError, Theme, ThemeManager};
