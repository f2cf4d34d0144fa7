//! Convenience re-exports for common use.

pub use crate::broker::{InMemoryBroker, MessageBroker, MessageHandler, QueueBinding};
pub use crate::chat::ChatService;
pub use crate::config::CourierConfig;
pub use crate::delivery::{
    BlockingDelivery, QueueTicket, StreamHandle, StreamSink, StreamState, StreamingDelivery,
};
pub use crate::error::{CourierError, Result};
pub use crate::history::HistoryProducer;
pub use crate::pipeline::{
    ChatPipeline, ChunkStream, ContextRetriever, NoRetrieval, OpenAiCompatiblePipeline,
};
pub use crate::registry::{PendingRequestRegistry, PendingReply};
pub use crate::types::{
    ChatMessage, ChatReply, ChatRequest, HistoryEnvelope, HistoryMessage, JobEnvelope, Role,
    StreamFrame, Usage,
};
pub use crate::util::retry::RetryPolicy;
pub use crate::worker::ChatWorker;
