//! Fire-and-forget transcript hand-off to history persistence.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::broker::MessageBroker;
use crate::config::MessagingConfig;
use crate::types::HistoryEnvelope;

/// Publishes completed transcripts onto the history queue.
///
/// Persistence itself is somebody else's job; failures here are logged
/// and swallowed so they can never take down the delivery path.
#[derive(Clone)]
pub struct HistoryProducer {
    broker: Arc<dyn MessageBroker>,
    exchange: String,
    routing_key: String,
}

impl HistoryProducer {
    pub fn new(broker: Arc<dyn MessageBroker>, config: &MessagingConfig) -> Self {
        Self {
            broker,
            exchange: config.history_exchange.clone(),
            routing_key: config.history_routing_key.clone(),
        }
    }

    /// Queue a transcript for persistence.
    pub async fn publish(&self, envelope: HistoryEnvelope) {
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode history envelope");
                return;
            }
        };
        match self
            .broker
            .publish(&self.exchange, &self.routing_key, &payload)
            .await
        {
            Ok(()) => debug!(
                session_id = %envelope.session_id,
                user_id = %envelope.user_id,
                "queued transcript for persistence"
            ),
            Err(e) => warn!(
                session_id = %envelope.session_id,
                error = %e,
                "failed to queue transcript"
            ),
        }
    }
}
