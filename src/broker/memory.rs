//! In-process broker for deployments without a real queue, and for
//! deterministic tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{MessageBroker, MessageHandler, QueueBinding};
use crate::error::{CourierError, Result};

/// Total delivery attempts for a failing message before it is dropped.
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

struct Delivery {
    payload: Vec<u8>,
    attempt: u32,
}

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>;

#[derive(Default)]
struct Shared {
    /// (exchange, routing key) → queue.
    bindings: HashMap<(String, String), String>,
    senders: HashMap<String, mpsc::UnboundedSender<Delivery>>,
    /// The broker keeps every receiver alive: a queue outlives its
    /// consumers, like on a real broker.
    receivers: HashMap<String, SharedReceiver>,
    /// Queues already claimed by a `consume` call.
    claimed: HashSet<String>,
}

/// Direct-exchange broker backed by unbounded in-process channels.
///
/// Delivery across request ids is unordered with respect to completion,
/// and a failed handler run redelivers the message — the same contract a
/// real broker gives.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare(&self, binding: &QueueBinding) -> Result<()> {
        let mut shared = self.shared.lock().await;
        if !shared.senders.contains_key(&binding.queue) {
            let (tx, rx) = mpsc::unbounded_channel();
            shared.senders.insert(binding.queue.clone(), tx);
            shared
                .receivers
                .insert(binding.queue.clone(), Arc::new(Mutex::new(rx)));
        }
        shared.bindings.insert(
            (binding.exchange.clone(), binding.routing_key.clone()),
            binding.queue.clone(),
        );
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        let shared = self.shared.lock().await;
        let queue = shared
            .bindings
            .get(&(exchange.to_string(), routing_key.to_string()))
            .ok_or_else(|| {
                CourierError::Broker(format!(
                    "no binding for exchange {exchange} with routing key {routing_key}"
                ))
            })?;
        let sender = shared
            .senders
            .get(queue)
            .ok_or_else(|| CourierError::Broker(format!("queue {queue} not declared")))?;
        sender
            .send(Delivery {
                payload: payload.to_vec(),
                attempt: 1,
            })
            .map_err(|_| CourierError::Broker(format!("queue {queue} is closed")))?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        concurrency: usize,
        handler: Arc<dyn MessageHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if concurrency == 0 {
            return Err(CourierError::InvalidArgument(
                "consumer concurrency must be at least 1".into(),
            ));
        }
        let (requeue, receiver) = {
            let mut shared = self.shared.lock().await;
            if !shared.claimed.insert(queue.to_string()) {
                return Err(CourierError::Broker(format!(
                    "queue {queue} already has a consumer"
                )));
            }
            let receiver = shared.receivers.get(queue).cloned().ok_or_else(|| {
                CourierError::Broker(format!("queue {queue} not declared"))
            })?;
            let requeue = shared
                .senders
                .get(queue)
                .cloned()
                .ok_or_else(|| CourierError::Broker(format!("queue {queue} not declared")))?;
            (requeue, receiver)
        };

        for worker in 0..concurrency {
            let receiver = receiver.clone();
            let handler = handler.clone();
            let requeue = requeue.clone();
            let cancel = cancel.clone();
            let queue = queue.to_string();
            tokio::spawn(async move {
                debug!(queue = %queue, worker, "consumer started");
                loop {
                    // Hold the receiver lock only while waiting for the
                    // next delivery, never while processing it.
                    let delivery = {
                        let mut rx = receiver.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            delivery = rx.recv() => match delivery {
                                Some(delivery) => delivery,
                                None => break,
                            },
                        }
                    };

                    if let Err(e) = handler.handle(&delivery.payload).await {
                        if delivery.attempt < MAX_DELIVERY_ATTEMPTS {
                            warn!(
                                queue = %queue,
                                attempt = delivery.attempt,
                                error = %e,
                                "handler failed; redelivering"
                            );
                            let _ = requeue.send(Delivery {
                                payload: delivery.payload,
                                attempt: delivery.attempt + 1,
                            });
                        } else {
                            error!(
                                queue = %queue,
                                attempts = delivery.attempt,
                                error = %e,
                                "handler kept failing; dropping message"
                            );
                        }
                    }
                }
                debug!(queue = %queue, worker, "consumer stopped");
            });
        }
        Ok(())
    }
}
