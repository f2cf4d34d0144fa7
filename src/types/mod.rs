//! Core data types.

pub mod envelope;
pub mod frame;
pub mod message;
pub mod reply;
pub mod request;

pub use envelope::{HistoryEnvelope, HistoryMessage, JobEnvelope};
pub use frame::StreamFrame;
pub use message::{ChatMessage, Role};
pub use reply::{ChatReply, Usage};
pub use request::ChatRequest;
