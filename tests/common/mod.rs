//! Shared fixtures: scripted pipelines, recording sinks and brokers,
//! and pre-wired delivery stacks.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier::broker::{InMemoryBroker, MessageBroker, MessageHandler, QueueBinding};
use courier::chat::ChatService;
use courier::config::{MessagingConfig, StreamingConfig};
use courier::delivery::{BlockingDelivery, StreamSink, StreamingDelivery};
use courier::error::{CourierError, Result};
use courier::history::HistoryProducer;
use courier::pipeline::{ChatPipeline, ChunkStream, NoRetrieval};
use courier::registry::PendingRequestRegistry;
use courier::types::{ChatMessage, ChatRequest, StreamFrame};
use courier::worker::ChatWorker;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// A user request with a single message.
pub fn user_request(text: &str) -> ChatRequest {
    ChatRequest::new("requested-model", vec![ChatMessage::user(text)])
}

/// Let spawned tasks make progress on the current-thread runtime.
pub async fn drain_tasks() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Pipeline returning a canned completion, recording every prompt.
pub struct StaticPipeline {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl StaticPipeline {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatPipeline for StaticPipeline {
    fn model_id(&self) -> &str {
        "static"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        Ok(self.reply.clone())
    }

    async fn stream(&self, prompt: &str, _cancel: CancellationToken) -> Result<ChunkStream> {
        self.prompts.lock().await.push(prompt.to_string());
        let reply = self.reply.clone();
        Ok(Box::pin(futures::stream::once(async move { Ok(reply) })))
    }
}

/// Pipeline that always fails.
pub struct FailingPipeline {
    pub message: String,
}

#[async_trait]
impl ChatPipeline for FailingPipeline {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(CourierError::Pipeline(self.message.clone()))
    }

    async fn stream(&self, _prompt: &str, _cancel: CancellationToken) -> Result<ChunkStream> {
        Err(CourierError::Pipeline(self.message.clone()))
    }
}

/// Feed for a [`ChannelPipeline`] stream: `Ok` chunks or an error
/// message.
pub type ChunkFeed = mpsc::UnboundedSender<std::result::Result<String, String>>;

/// Pipeline streaming whatever the test feeds through a channel, with
/// cooperative cancellation at every emission point.
pub struct ChannelPipeline {
    rx: Mutex<Option<mpsc::UnboundedReceiver<std::result::Result<String, String>>>>,
}

impl ChannelPipeline {
    /// Manually fed stream; keep the sender to drive it.
    pub fn new() -> (ChunkFeed, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx: Mutex::new(Some(rx)),
            },
        )
    }

    /// Pre-scripted stream: the given chunks, then completion.
    pub fn with_chunks(chunks: &[&str]) -> Self {
        let (tx, pipeline) = Self::new();
        for chunk in chunks {
            tx.send(Ok(chunk.to_string())).unwrap();
        }
        // Dropping the sender ends the stream after the chunks.
        pipeline
    }

    /// Pre-scripted stream: the given chunks, then an upstream error.
    pub fn with_chunks_then_error(chunks: &[&str], error: &str) -> Self {
        let (tx, pipeline) = Self::new();
        for chunk in chunks {
            tx.send(Ok(chunk.to_string())).unwrap();
        }
        tx.send(Err(error.to_string())).unwrap();
        pipeline
    }
}

#[async_trait]
impl ChatPipeline for ChannelPipeline {
    fn model_id(&self) -> &str {
        "channel"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(CourierError::Pipeline("channel pipeline is stream-only".into()))
    }

    async fn stream(&self, _prompt: &str, cancel: CancellationToken) -> Result<ChunkStream> {
        let mut rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or_else(|| CourierError::InvalidState("stream already taken".into()))?;
        let stream = async_stream::stream! {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    item = rx.recv() => item,
                };
                match item {
                    Some(Ok(chunk)) => yield Ok(chunk),
                    Some(Err(message)) => {
                        yield Err(CourierError::Pipeline(message));
                        break;
                    }
                    None => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Pipeline whose stream call itself fails.
pub struct BrokenPipeline;

#[async_trait]
impl ChatPipeline for BrokenPipeline {
    fn model_id(&self) -> &str {
        "broken"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(CourierError::Pipeline("cannot complete".into()))
    }

    async fn stream(&self, _prompt: &str, _cancel: CancellationToken) -> Result<ChunkStream> {
        Err(CourierError::Pipeline("cannot start stream".into()))
    }
}

/// Sink recording every frame; optionally starts failing at the n-th
/// send attempt (0-based) to simulate a client disconnect.
pub struct RecordingSink {
    frames: std::sync::Mutex<Vec<StreamFrame>>,
    attempts: AtomicUsize,
    fail_from: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: std::sync::Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_from: None,
        })
    }

    pub fn failing_from(attempt: usize) -> Arc<Self> {
        Arc::new(Self {
            frames: std::sync::Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_from: Some(attempt),
        })
    }

    pub fn frames(&self) -> Vec<StreamFrame> {
        self.frames.lock().unwrap().clone()
    }

    /// Total send attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn terminal_count(&self) -> usize {
        self.frames().iter().filter(|f| f.is_terminal()).count()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.frames()
            .iter()
            .filter(|f| matches!(f, StreamFrame::Heartbeat))
            .count()
    }
}

#[async_trait]
impl StreamSink for RecordingSink {
    async fn send(&self, frame: &StreamFrame) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(fail_from) = self.fail_from {
            if attempt >= fail_from {
                return Err(CourierError::Stream("client disconnected".into()));
            }
        }
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

/// Broker recording publishes without routing them anywhere.
#[derive(Default)]
pub struct RecordingBroker {
    published: std::sync::Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl RecordingBroker {
    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBroker for RecordingBroker {
    async fn declare(&self, _binding: &QueueBinding) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        self.published.lock().unwrap().push((
            exchange.to_string(),
            routing_key.to_string(),
            payload.to_vec(),
        ));
        Ok(())
    }

    async fn consume(
        &self,
        _queue: &str,
        _concurrency: usize,
        _handler: Arc<dyn MessageHandler>,
        _cancel: CancellationToken,
    ) -> Result<()> {
        Err(CourierError::Broker("recording broker does not consume".into()))
    }
}

/// Broker whose publishes always fail, like an unreachable backend.
pub struct FailingBroker;

#[async_trait]
impl MessageBroker for FailingBroker {
    async fn declare(&self, _binding: &QueueBinding) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, _exchange: &str, _routing_key: &str, _payload: &[u8]) -> Result<()> {
        Err(CourierError::Broker("broker unreachable".into()))
    }

    async fn consume(
        &self,
        _queue: &str,
        _concurrency: usize,
        _handler: Arc<dyn MessageHandler>,
        _cancel: CancellationToken,
    ) -> Result<()> {
        Err(CourierError::Broker("broker unreachable".into()))
    }
}

/// Pre-wired blocking stack over the in-memory broker.
pub struct TestStack {
    pub delivery: BlockingDelivery,
    pub registry: PendingRequestRegistry,
    pub broker: Arc<InMemoryBroker>,
    pub messaging: MessagingConfig,
}

/// Build a blocking-delivery stack; `with_worker` controls whether a
/// consumer is actually draining the chat queue.
pub async fn blocking_stack(pipeline: Arc<dyn ChatPipeline>, with_worker: bool) -> TestStack {
    let messaging = MessagingConfig::default();
    let broker = Arc::new(InMemoryBroker::new());
    broker.declare(&messaging.chat_binding()).await.unwrap();
    broker.declare(&messaging.history_binding()).await.unwrap();

    let registry = PendingRequestRegistry::new();
    if with_worker {
        let broker_dyn: Arc<dyn MessageBroker> = broker.clone();
        let chat = ChatService::new(pipeline, Arc::new(NoRetrieval));
        let history = HistoryProducer::new(broker_dyn, &messaging);
        let worker = Arc::new(ChatWorker::new(
            chat,
            registry.clone(),
            history,
            "test-model",
        ));
        broker
            .consume(
                &messaging.chat_queue,
                messaging.concurrency,
                worker,
                CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    let delivery = BlockingDelivery::new(broker.clone(), registry.clone(), messaging.clone());
    TestStack {
        delivery,
        registry,
        broker,
        messaging,
    }
}

/// Streaming delivery over a recording broker for history capture.
pub fn streaming_stack(
    pipeline: Arc<dyn ChatPipeline>,
    heartbeat_interval_ms: u64,
) -> (StreamingDelivery, Arc<RecordingBroker>) {
    let messaging = MessagingConfig::default();
    let recorder = Arc::new(RecordingBroker::default());
    let history = HistoryProducer::new(recorder.clone(), &messaging);
    let chat = ChatService::new(pipeline, Arc::new(NoRetrieval));
    let delivery = StreamingDelivery::new(
        chat,
        history,
        StreamingConfig {
            heartbeat_interval_ms,
        },
        "test-model",
    );
    (delivery, recorder)
}
