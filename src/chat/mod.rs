//! Chat orchestration over the pipeline and retrieval collaborators.

pub mod session;

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Result;
use crate::pipeline::prompt::{build_prompt, estimate_tokens};
use crate::pipeline::{ChatPipeline, ChunkStream, ContextRetriever};
use crate::types::{ChatReply, ChatRequest, Usage};

/// Snippets requested from the retriever per query.
const RETRIEVAL_LIMIT: usize = 5;

/// Builds prompts and invokes the model pipeline.
#[derive(Clone)]
pub struct ChatService {
    pipeline: Arc<dyn ChatPipeline>,
    retriever: Arc<dyn ContextRetriever>,
}

impl ChatService {
    pub fn new(pipeline: Arc<dyn ChatPipeline>, retriever: Arc<dyn ContextRetriever>) -> Self {
        Self {
            pipeline,
            retriever,
        }
    }

    /// One-shot chat: build the prompt, invoke the model, assemble the
    /// reply with usage estimates and a derived session title.
    pub async fn chat(&self, request: &ChatRequest, user_id: &str) -> Result<ChatReply> {
        let prompt = self.build(request, user_id).await;
        let content = self.pipeline.complete(&prompt).await?;
        let usage = Usage::from_estimates(estimate_tokens(&prompt), estimate_tokens(&content));
        Ok(ChatReply {
            content,
            usage,
            session_id: request.session_id.clone(),
            session_title: session::derive_session_title(request),
        })
    }

    /// Streaming chat: same prompt, live chunk stream. Empty chunks are
    /// dropped before they reach the wire.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        user_id: &str,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let prompt = self.build(request, user_id).await;
        let stream = self.pipeline.stream(&prompt, cancel).await?;
        let filtered = stream.filter(|chunk| {
            let keep = !matches!(chunk, Ok(text) if text.is_empty());
            futures::future::ready(keep)
        });
        Ok(Box::pin(filtered))
    }

    /// Retrieval is best-effort: a failing retriever degrades to a plain
    /// conversation prompt.
    async fn build(&self, request: &ChatRequest, user_id: &str) -> String {
        let context = match request.latest_user_message() {
            Some(query) => match self
                .retriever
                .retrieve(user_id, query, RETRIEVAL_LIMIT)
                .await
            {
                Ok(snippets) => snippets,
                Err(e) => {
                    warn!(error = %e, "context retrieval failed; continuing without it");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        build_prompt(request, &context)
    }
}
