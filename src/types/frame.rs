//! Server-push stream frames and their wire encoding.

use serde_json::json;

/// One frame pushed over a live streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Sent once, immediately after the connection opens.
    Session { session_id: String, title: String },
    /// One incremental content chunk.
    Chunk(String),
    /// Keep-alive sent on a fixed interval to defeat idle-connection
    /// teardown by intermediaries.
    Heartbeat,
    /// Terminal success frame.
    Done,
    /// Terminal failure frame carrying a sanitized message.
    Error(String),
}

impl StreamFrame {
    /// Whether this frame terminates the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    /// Render the frame as one line-delimited server-sent event.
    ///
    /// Payloads go through JSON string encoding, so quotes, newlines and
    /// backslashes in chunk text cannot break the framing.
    pub fn encode(&self) -> String {
        match self {
            Self::Session { session_id, title } => format!(
                "event: session\ndata: {}\n\n",
                json!({ "sessionId": session_id, "title": title })
            ),
            Self::Chunk(text) => format!(
                "data: {}\n\n",
                json!({ "message": { "content": text } })
            ),
            Self::Heartbeat => "event: heartbeat\ndata: ping\n\n".to_string(),
            Self::Done => "data: {\"done\":true}\n\n".to_string(),
            Self::Error(message) => format!("data: {}\n\n", json!({ "error": message })),
        }
    }
}
