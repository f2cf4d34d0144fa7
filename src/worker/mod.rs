//! Queue-side worker: consumes job envelopes and settles the registry.

use async_trait::async_trait;
use tracing::{debug, error};

use crate::broker::MessageHandler;
use crate::chat::ChatService;
use crate::error::Result;
use crate::history::HistoryProducer;
use crate::registry::PendingRequestRegistry;
use crate::types::{ChatReply, HistoryEnvelope, JobEnvelope};

/// Consumes one job envelope per delivery: runs the chat, settles the
/// matching registry entry, and queues the transcript for persistence.
///
/// Redelivered envelopes re-settle an entry that is usually gone
/// already; the registry treats that as a logged no-op, so reprocessing
/// is harmless.
pub struct ChatWorker {
    chat: ChatService,
    registry: PendingRequestRegistry,
    history: HistoryProducer,
    /// Configured model name, recorded in history over the one the
    /// client asked for.
    model: String,
}

impl ChatWorker {
    pub fn new(
        chat: ChatService,
        registry: PendingRequestRegistry,
        history: HistoryProducer,
        model: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            registry,
            history,
            model: model.into(),
        }
    }

    fn history_envelope(
        &self,
        envelope: &JobEnvelope,
        reply: &ChatReply,
    ) -> Option<HistoryEnvelope> {
        let user_message = envelope.request.latest_user_message()?;
        let model = if self.model.is_empty() {
            &envelope.request.model
        } else {
            &self.model
        };
        HistoryEnvelope::from_exchange(
            reply.session_id.as_deref().unwrap_or_default(),
            &envelope.user_id,
            reply.session_title.as_deref(),
            model,
            user_message,
            &reply.content,
        )
    }
}

#[async_trait]
impl MessageHandler for ChatWorker {
    async fn handle(&self, payload: &[u8]) -> Result<()> {
        let envelope: JobEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                // No request id to settle, and redelivery cannot parse it
                // any better: ack and drop.
                error!(error = %e, "dropping malformed job envelope");
                return Ok(());
            }
        };

        debug!(
            request_id = %envelope.request_id,
            user_id = %envelope.user_id,
            "processing chat job"
        );

        match self.chat.chat(&envelope.request, &envelope.user_id).await {
            Ok(reply) => {
                let history = self.history_envelope(&envelope, &reply);
                self.registry.settle(&envelope.request_id, reply).await;
                if let Some(history) = history {
                    self.history.publish(history).await;
                }
            }
            Err(e) => {
                error!(
                    request_id = %envelope.request_id,
                    error = %e,
                    "chat job failed"
                );
                self.registry.fail(&envelope.request_id, e).await;
            }
        }
        Ok(())
    }
}
