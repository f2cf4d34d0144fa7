//! Session id and title helpers.

use uuid::Uuid;

use crate::types::{ChatRequest, Role};

/// Longest derived session title, in characters.
const TITLE_MAX_CHARS: usize = 50;

/// Reuse the client-provided session id or mint a fresh one.
pub fn resolve_session_id(request: &ChatRequest) -> String {
    match request.session_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// Title for a new session: the first non-empty user message, trimmed
/// and cut at [`TITLE_MAX_CHARS`] characters.
pub fn derive_session_title(request: &ChatRequest) -> Option<String> {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        .map(|m| m.content.trim().chars().take(TITLE_MAX_CHARS).collect())
}
