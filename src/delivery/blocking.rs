//! Blocking delivery: submit a job, await one result within a deadline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::MessageBroker;
use crate::config::MessagingConfig;
use crate::error::{CourierError, Result};
use crate::registry::{PendingRequestRegistry, PendingReply};
use crate::types::{ChatReply, ChatRequest, JobEnvelope};

/// Submission receipt: the request id and its read-once completion
/// handle.
#[derive(Debug)]
pub struct QueueTicket {
    pub request_id: String,
    pub reply: PendingReply,
}

/// Request/response façade over the broker and registry.
#[derive(Clone)]
pub struct BlockingDelivery {
    broker: Arc<dyn MessageBroker>,
    registry: PendingRequestRegistry,
    config: MessagingConfig,
}

impl BlockingDelivery {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        registry: PendingRequestRegistry,
        config: MessagingConfig,
    ) -> Self {
        Self {
            broker,
            registry,
            config,
        }
    }

    /// Mint a request id, register it, and publish the job envelope.
    ///
    /// Registration happens before publishing so a fast worker can never
    /// settle an id that is not yet known. A publish failure fails the
    /// fresh registry entry before propagating: the worker will never
    /// run, so nobody else could.
    pub async fn submit(&self, request: ChatRequest, user_id: &str) -> Result<QueueTicket> {
        request.validate()?;
        let request_id = Uuid::new_v4().to_string();
        let envelope = JobEnvelope::new(request_id.as_str(), user_id, request);
        let payload = serde_json::to_vec(&envelope)?;

        let reply = self.registry.register(&request_id).await?;
        if let Err(e) = self
            .broker
            .publish(
                &self.config.chat_exchange,
                &self.config.chat_routing_key,
                &payload,
            )
            .await
        {
            warn!(request_id = %request_id, error = %e, "publish failed; failing pending request");
            self.registry
                .fail(
                    &request_id,
                    CourierError::Broker(format!("publish failed: {e}")),
                )
                .await;
            return Err(e);
        }

        debug!(request_id = %request_id, user_id = %user_id, "queued chat job");
        Ok(QueueTicket {
            request_id,
            reply,
        })
    }

    /// Await settlement with a deadline.
    ///
    /// If the deadline fires first the registry entry is expired and
    /// [`CourierError::Timeout`] is returned — machine-distinguishable
    /// from a worker-reported failure. A settlement that arrives after
    /// expiry finds nothing to settle and is discarded by the registry.
    /// Either way, exactly one outcome is ever returned.
    pub async fn await_reply(&self, ticket: QueueTicket, timeout: Duration) -> Result<ChatReply> {
        let QueueTicket { request_id, reply } = ticket;
        match tokio::time::timeout(timeout, reply.await_reply()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.registry.expire(&request_id).await;
                warn!(request_id = %request_id, timeout_ms = timeout.as_millis() as u64, "chat request timed out");
                Err(CourierError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Submit and await with the configured end-to-end timeout.
    pub async fn ask(&self, request: ChatRequest, user_id: &str) -> Result<ChatReply> {
        let ticket = self.submit(request, user_id).await?;
        self.await_reply(ticket, self.config.request_timeout())
            .await
    }
}
