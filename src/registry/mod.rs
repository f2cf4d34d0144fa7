//! Pending-request registry correlating submitted jobs with waiters.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::{CourierError, Result};
use crate::types::ChatReply;

/// Settlement outcome delivered to the waiter.
type Settlement = std::result::Result<ChatReply, CourierError>;

/// Read-once completion handle for one registered request.
///
/// Dropping the handle instead of awaiting it is safe: a late settlement
/// then finds no receiver and is discarded.
#[derive(Debug)]
pub struct PendingReply {
    request_id: String,
    rx: oneshot::Receiver<Settlement>,
}

impl PendingReply {
    /// Id of the request this handle belongs to.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the worker's settlement.
    pub async fn await_reply(self) -> Result<ChatReply> {
        match self.rx.await {
            Ok(settlement) => settlement,
            Err(_) => Err(CourierError::InvalidState(
                "registry dropped before settlement".into(),
            )),
        }
    }
}

/// Thread-safe map of in-flight request ids to their waiters.
///
/// Entries are removed atomically at settlement — success, failure, or
/// waiter-side expiry — so the map never outgrows the number of requests
/// actually in flight. Settling an id that is no longer present is a
/// logged no-op; that is the expected resolution of the timeout race,
/// not an error.
#[derive(Clone, Default)]
pub struct PendingRequestRegistry {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<Settlement>>>>,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request.
    ///
    /// Request ids are caller-minted uuids; a duplicate is a caller bug
    /// and is rejected rather than silently replacing the earlier waiter.
    pub async fn register(&self, request_id: &str) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();
        let mut map = self.inner.lock().await;
        if map.contains_key(request_id) {
            return Err(CourierError::InvalidState(format!(
                "request {request_id} already registered"
            )));
        }
        map.insert(request_id.to_string(), tx);
        Ok(PendingReply {
            request_id: request_id.to_string(),
            rx,
        })
    }

    /// Settle a pending request with a reply.
    pub async fn settle(&self, request_id: &str, reply: ChatReply) {
        self.finish(request_id, Ok(reply)).await;
    }

    /// Settle a pending request with a failure.
    pub async fn fail(&self, request_id: &str, error: CourierError) {
        self.finish(request_id, Err(error)).await;
    }

    async fn finish(&self, request_id: &str, settlement: Settlement) {
        // Removal and notification are one step: whoever removes the
        // sender is the only party that can notify.
        let sender = self.inner.lock().await.remove(request_id);
        match sender {
            Some(tx) => {
                if tx.send(settlement).is_err() {
                    debug!(request_id = %request_id, "waiter gone before settlement; discarding");
                }
            }
            None => {
                warn!(
                    request_id = %request_id,
                    "no pending request to settle; likely timed out or cancelled"
                );
            }
        }
    }

    /// Remove an entry without notifying: the waiter gave up.
    pub async fn expire(&self, request_id: &str) {
        if self.inner.lock().await.remove(request_id).is_some() {
            debug!(request_id = %request_id, "expired pending request");
        }
    }

    /// Number of requests currently in flight.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no requests are in flight.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
