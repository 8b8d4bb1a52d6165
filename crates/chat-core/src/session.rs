//! Request orchestration: `Idle -> Sending -> Idle`, one prompt at a time.
//!
//! The session owns the log and the in-flight flag. The UI asks it whether a
//! send may start and hands it the outcome; it never consults UI widget state.

use thiserror::Error;
use tracing::{info, warn};

use crate::client::{GenerateClient, Generation, RequestError};
use crate::state::{ChatLog, ChatRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Sending,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendRejected {
    #[error("Please enter a prompt.")]
    EmptyPrompt,
    #[error("A request is already in progress.")]
    InFlight,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    log: ChatLog,
    state: RequestState,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ChatLog {
        &mut self.log
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_sending(&self) -> bool {
        self.state == RequestState::Sending
    }

    /// Validate the input, append it as the user's message and enter `Sending`.
    ///
    /// Returns the trimmed prompt to send.
    pub fn begin_send(&mut self, input: &str) -> Result<String, SendRejected> {
        if self.is_sending() {
            return Err(SendRejected::InFlight);
        }

        let prompt = input.trim();
        if prompt.is_empty() {
            return Err(SendRejected::EmptyPrompt);
        }

        self.log.append(ChatRole::User, prompt, None);
        self.state = RequestState::Sending;
        info!(chars = prompt.chars().count(), "sending prompt");
        Ok(prompt.to_string())
    }

    /// Record the outcome and return to `Idle`.
    ///
    /// Returns the role of the appended message, or `None` when no request was
    /// in flight (the outcome is then discarded).
    pub fn complete(&mut self, outcome: Result<Generation, RequestError>) -> Option<ChatRole> {
        if !self.is_sending() {
            warn!("request outcome arrived while idle; ignoring");
            return None;
        }

        let role = match outcome {
            Ok(generation) => {
                info!(
                    chars = generation.response.chars().count(),
                    duration = ?generation.duration,
                    "response received"
                );
                self.log
                    .append(ChatRole::Assistant, generation.response, generation.duration);
                ChatRole::Assistant
            }
            Err(e) => {
                warn!(error = %e, "generate request failed");
                self.log.append(ChatRole::Error, e.user_message(), None);
                ChatRole::Error
            }
        };

        self.state = RequestState::Idle;
        self.log.request_scroll_to_bottom();
        Some(role)
    }

    /// Whole request cycle in one call.
    pub async fn send(
        &mut self,
        client: &GenerateClient,
        input: &str,
    ) -> Result<ChatRole, SendRejected> {
        let prompt = self.begin_send(input)?;
        let outcome = client.generate(&prompt).await;
        Ok(self.complete(outcome).unwrap_or(ChatRole::Error))
    }
}
