//! Courier — broker-backed chat delivery core.
//!
//! Courier decouples *submission* of a chat job from its *completion*
//! across two delivery modes:
//!
//! - **Blocking**: submit a job to the broker, await exactly one result
//!   within a deadline, and report a timeout distinctly from a worker
//!   failure ([`delivery::BlockingDelivery`]).
//! - **Streaming**: push incremental chunks over a long-lived channel
//!   with periodic heartbeats and an exactly-once terminal frame
//!   ([`delivery::StreamingDelivery`]).
//!
//! The [`registry::PendingRequestRegistry`] correlates in-flight request
//! ids with waiters; the [`broker::MessageBroker`] carries job envelopes
//! with at-least-once semantics; the model pipeline and retrieval are
//! collaborators behind [`pipeline::ChatPipeline`] and
//! [`pipeline::ContextRetriever`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier::broker::{InMemoryBroker, MessageBroker};
//! use courier::chat::ChatService;
//! use courier::config::CourierConfig;
//! use courier::delivery::BlockingDelivery;
//! use courier::history::HistoryProducer;
//! use courier::pipeline::{NoRetrieval, OpenAiCompatiblePipeline};
//! use courier::registry::PendingRequestRegistry;
//! use courier::types::{ChatMessage, ChatRequest};
//! use courier::worker::ChatWorker;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> courier::error::Result<()> {
//! let config = CourierConfig::from_env();
//! let broker: Arc<dyn MessageBroker> = Arc::new(InMemoryBroker::new());
//! broker.declare(&config.messaging.chat_binding()).await?;
//! broker.declare(&config.messaging.history_binding()).await?;
//!
//! let registry = PendingRequestRegistry::new();
//! let pipeline = Arc::new(OpenAiCompatiblePipeline::new(&config.pipeline));
//! let chat = ChatService::new(pipeline, Arc::new(NoRetrieval));
//! let history = HistoryProducer::new(broker.clone(), &config.messaging);
//! let worker = Arc::new(ChatWorker::new(
//!     chat,
//!     registry.clone(),
//!     history,
//!     config.pipeline.model.clone(),
//! ));
//! broker
//!     .consume(
//!         &config.messaging.chat_queue,
//!         config.messaging.concurrency,
//!         worker,
//!         CancellationToken::new(),
//!     )
//!     .await?;
//!
//! let delivery = BlockingDelivery::new(broker, registry, config.messaging.clone());
//! let request = ChatRequest::new("default", vec![ChatMessage::user("Hello!")]);
//! let reply = delivery.ask(request, "user-1").await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod chat;
pub mod config;
pub mod delivery;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod prelude;
pub mod registry;
pub mod types;
pub mod util;
pub mod worker;
