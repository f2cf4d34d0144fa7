//! Queue envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Role;
use super::request::ChatRequest;

/// The message published to the broker for one chat job.
///
/// Immutable once published. `request_id` correlates the worker's
/// settlement with the registered waiter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobEnvelope {
    pub request_id: String,
    pub user_id: String,
    pub request: ChatRequest,
    pub created_at: DateTime<Utc>,
}

impl JobEnvelope {
    /// Envelope stamped with the current time.
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        request: ChatRequest,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            request,
            created_at: Utc::now(),
        }
    }
}

/// One persisted message inside a [`HistoryEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryMessage {
    /// User-side message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Assistant-side message stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Fire-and-forget transcript hand-off consumed by history persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEnvelope {
    pub session_id: String,
    pub user_id: String,
    pub session_title: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<HistoryMessage>,
}

impl HistoryEnvelope {
    /// Assemble the user/assistant exchange recorded after a completed
    /// chat.
    ///
    /// Returns `None` when there is nothing worth persisting (no session
    /// or no user message). The title falls back to the user message; an
    /// empty assistant reply is omitted rather than stored blank.
    pub fn from_exchange(
        session_id: &str,
        user_id: &str,
        session_title: Option<&str>,
        model: &str,
        user_message: &str,
        assistant_reply: &str,
    ) -> Option<Self> {
        if session_id.trim().is_empty() || user_message.trim().is_empty() {
            return None;
        }
        let mut messages = vec![HistoryMessage::user(user_message)];
        if !assistant_reply.trim().is_empty() {
            messages.push(HistoryMessage::assistant(assistant_reply));
        }
        let title = session_title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(user_message);
        Some(Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            session_title: title.to_string(),
            model: model.to_string(),
            created_at: Utc::now(),
            messages,
        })
    }
}
