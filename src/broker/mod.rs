//! Message broker abstraction and in-memory implementation.
//!
//! The broker models at-least-once, possibly-reordered, possibly-
//! duplicated delivery: a message is acknowledged only after the handler
//! returns `Ok`, and a failed run is redelivered. Consumers must
//! therefore tolerate reprocessing the same payload.

pub mod memory;

pub use memory::InMemoryBroker;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A queue binding: messages published to `exchange` with `routing_key`
/// land in `queue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

/// Processing callback invoked once per delivered message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivery. Returning an error triggers redelivery.
    async fn handle(&self, payload: &[u8]) -> Result<()>;
}

/// Publish/consume surface of the message broker.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declare a binding so published messages are routable.
    async fn declare(&self, binding: &QueueBinding) -> Result<()>;

    /// Publish a payload and return once it is enqueued.
    ///
    /// Failure is surfaced synchronously; the caller owns any registry
    /// bookkeeping for a job that will now never run.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()>;

    /// Start `concurrency` consumer tasks on `queue` running until the
    /// token is cancelled. Returns once the consumers are installed.
    async fn consume(
        &self,
        queue: &str,
        concurrency: usize,
        handler: Arc<dyn MessageHandler>,
        cancel: CancellationToken,
    ) -> Result<()>;
}
