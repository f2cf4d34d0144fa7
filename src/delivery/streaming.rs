//! Streaming delivery: a long-lived push channel with heartbeats and
//! exactly-once termination.
//!
//! One connection is driven by a single-writer loop multiplexing three
//! signals — upstream chunks, heartbeat ticks, and cancellation — so
//! frames can never reorder and only one branch ever reaches the
//! terminal state. Closing releases the upstream subscription (via the
//! shared cancellation token) and the heartbeat timer together.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::chat::{session, ChatService};
use crate::config::StreamingConfig;
use crate::error::{CourierError, Result};
use crate::history::HistoryProducer;
use crate::types::{ChatRequest, HistoryEnvelope, StreamFrame};

/// Client-facing push channel. A failed send means the client is gone.
#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn send(&self, frame: &StreamFrame) -> Result<()>;
}

/// Sink writing encoded frames to any async writer, e.g. the write half
/// of a socket or a response body channel.
pub struct LineDelimitedSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> LineDelimitedSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the inner writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> StreamSink for LineDelimitedSink<W> {
    async fn send(&self, frame: &StreamFrame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame.encode().as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Lifecycle of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepted, nothing sent yet (the session frame does not count as
    /// data).
    Open,
    /// At least one chunk or heartbeat delivered.
    Streaming,
    /// Terminal; no further frames, ever.
    Closed,
}

const STATE_OPEN: u8 = 0;
const STATE_STREAMING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Caller-held handle for one streaming connection.
#[derive(Clone)]
pub struct StreamHandle {
    connection_id: Arc<str>,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
}

impl StreamHandle {
    fn new() -> Self {
        Self {
            connection_id: Uuid::new_v4().to_string().into(),
            cancel: CancellationToken::new(),
            state: Arc::new(AtomicU8::new(STATE_OPEN)),
        }
    }

    /// Connection identifier, for logs and correlation.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Cooperative teardown: client disconnect or explicit cancel. Safe
    /// to call any number of times, before or after the terminal frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => StreamState::Open,
            STATE_STREAMING => StreamState::Streaming,
            _ => StreamState::Closed,
        }
    }

    /// Whether the connection reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CLOSED
    }

    /// Resolves once the connection is fully torn down.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    fn mark_streaming(&self) {
        let _ = self.state.compare_exchange(
            STATE_OPEN,
            STATE_STREAMING,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }

    /// Transition to Closed. Returns true only for the caller that
    /// actually performed the transition.
    fn close(&self) -> bool {
        self.state.swap(STATE_CLOSED, Ordering::AcqRel) != STATE_CLOSED
    }
}

/// Push-mode delivery. Bypasses the broker: chunks come straight from
/// the model pipeline for real-time forwarding.
#[derive(Clone)]
pub struct StreamingDelivery {
    chat: ChatService,
    history: HistoryProducer,
    config: StreamingConfig,
    /// Configured model name, recorded in history over the one the
    /// client asked for.
    model: String,
}

impl StreamingDelivery {
    pub fn new(
        chat: ChatService,
        history: HistoryProducer,
        config: StreamingConfig,
        model: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            history,
            config,
            model: model.into(),
        }
    }

    /// Accept a connection and drive it on a background task.
    ///
    /// Returns immediately with the control handle; the connection runs
    /// until a terminal frame, a disconnect, or [`StreamHandle::cancel`].
    pub fn open(
        &self,
        request: ChatRequest,
        user_id: &str,
        sink: Arc<dyn StreamSink>,
    ) -> Result<StreamHandle> {
        request.validate()?;
        let handle = StreamHandle::new();
        let this = self.clone();
        let task_handle = handle.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            this.run(request, &user_id, sink, task_handle).await;
        });
        Ok(handle)
    }

    /// Drive one connection to its terminal state.
    pub async fn run(
        &self,
        request: ChatRequest,
        user_id: &str,
        sink: Arc<dyn StreamSink>,
        handle: StreamHandle,
    ) {
        let session_id = session::resolve_session_id(&request);
        let title = session::derive_session_title(&request).unwrap_or_default();

        // Session frame goes out before anything else. A failure here is
        // not fatal: the connection stays up and the heartbeat will
        // notice if the client is really gone.
        let session_frame = StreamFrame::Session {
            session_id: session_id.clone(),
            title: title.clone(),
        };
        if let Err(e) = sink.send(&session_frame).await {
            warn!(
                connection_id = %handle.connection_id(),
                error = %e,
                "failed to send session frame"
            );
        }

        let mut upstream = match self
            .chat
            .chat_stream(&request, user_id, handle.cancel.clone())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    connection_id = %handle.connection_id(),
                    error = %e,
                    "failed to start chat stream"
                );
                self.terminate(&sink, &handle, StreamFrame::Error(e.to_string()))
                    .await;
                return;
            }
        };

        let mut transcript = String::new();
        let period = self.config.heartbeat_interval();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Biased: a disconnect must win any race against upstream
            // completion, and chunks go out ahead of a due heartbeat.
            tokio::select! {
                biased;
                _ = handle.cancel.cancelled() => {
                    debug!(connection_id = %handle.connection_id(), "stream cancelled");
                    self.close_silently(&handle);
                    return;
                }
                chunk = upstream.next() => match chunk {
                    Some(Ok(text)) => {
                        if sink.send(&StreamFrame::Chunk(text.clone())).await.is_err() {
                            debug!(
                                connection_id = %handle.connection_id(),
                                "chunk send failed; closing stream"
                            );
                            self.close_silently(&handle);
                            return;
                        }
                        handle.mark_streaming();
                        transcript.push_str(&text);
                    }
                    Some(Err(e)) => {
                        error!(
                            connection_id = %handle.connection_id(),
                            error = %e,
                            "chat stream failed"
                        );
                        self.terminate(&sink, &handle, StreamFrame::Error(e.to_string()))
                            .await;
                        return;
                    }
                    None => {
                        debug!(connection_id = %handle.connection_id(), "chat stream complete");
                        self.terminate(&sink, &handle, StreamFrame::Done).await;
                        self.queue_history(&request, user_id, &session_id, &title, &transcript);
                        return;
                    }
                },
                _ = heartbeat.tick() => {
                    if sink.send(&StreamFrame::Heartbeat).await.is_err() {
                        // A dead heartbeat is how a silent disconnect is
                        // detected in the absence of chunk traffic.
                        debug!(
                            connection_id = %handle.connection_id(),
                            "heartbeat failed; closing stream"
                        );
                        self.close_silently(&handle);
                        return;
                    }
                    handle.mark_streaming();
                }
            }
        }
    }

    /// Exactly-once terminal frame, then full teardown. Later attempts —
    /// any path racing into Closed — are no-ops.
    async fn terminate(&self, sink: &Arc<dyn StreamSink>, handle: &StreamHandle, frame: StreamFrame) {
        if !handle.close() {
            return;
        }
        if let Err(e) = sink.send(&frame).await {
            debug!(
                connection_id = %handle.connection_id(),
                error = %e,
                "terminal frame send failed"
            );
        }
        handle.cancel.cancel();
    }

    /// Teardown without a terminal frame: the client is gone, so no
    /// further sends are attempted.
    fn close_silently(&self, handle: &StreamHandle) {
        handle.close();
        handle.cancel.cancel();
    }

    /// Hand the finished transcript to history persistence without
    /// blocking connection teardown.
    fn queue_history(
        &self,
        request: &ChatRequest,
        user_id: &str,
        session_id: &str,
        title: &str,
        transcript: &str,
    ) {
        let Some(user_message) = request.latest_user_message() else {
            return;
        };
        let model = if self.model.is_empty() {
            &request.model
        } else {
            &self.model
        };
        let Some(envelope) = HistoryEnvelope::from_exchange(
            session_id,
            user_id,
            Some(title).filter(|t| !t.is_empty()),
            model,
            user_message,
            transcript,
        ) else {
            return;
        };
        let history = self.history.clone();
        tokio::spawn(async move {
            history.publish(envelope).await;
        });
    }
}
