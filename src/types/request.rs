//! Chat request payload.

use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, Role};
use crate::error::{CourierError, Result};

/// A chat request as submitted by a client.
///
/// This is the prompt-construction payload carried inside a
/// [`JobEnvelope`](super::JobEnvelope); it is never mutated after
/// submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// Model requested by the client; the configured model may win over
    /// it at persistence time.
    pub model: String,
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Whether the client asked for streaming delivery.
    #[serde(default)]
    pub stream: bool,
    /// Preferred answer language, if the client expressed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang_hint: Option<String>,
    /// Session id minted by the client or echoed back from an earlier
    /// reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// Create a request with the given model and conversation.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            lang_hint: None,
            session_id: None,
        }
    }

    /// Set the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// The most recent non-empty user message, if any.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
    }

    /// Reject requests that cannot be processed.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(CourierError::InvalidArgument("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(CourierError::InvalidArgument(
                "messages must not be empty".into(),
            ));
        }
        Ok(())
    }
}
