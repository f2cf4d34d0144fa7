//! Chat reply and usage accounting.

use serde::{Deserialize, Serialize};

/// Token usage for one reply.
///
/// Counts are estimates (about four characters per token) unless the
/// pipeline reports exact numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Usage from prompt/completion estimates.
    pub fn from_estimates(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The final reply produced for one chat job.
///
/// Produced exactly once per blocking job or completed stream; the
/// delivery strategy that produced it hands it to the client and to
/// history persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    /// Full reply content.
    pub content: String,
    /// Token accounting for the exchange.
    pub usage: Usage,
    /// Session the exchange belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Title derived from the conversation, for brand-new sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_title: Option<String>,
}
