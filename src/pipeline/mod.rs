//! Model pipeline and retrieval collaborators.

pub mod openai;
pub mod prompt;

pub use openai::OpenAiCompatiblePipeline;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A live stream of incremental content chunks.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// The model-invocation pipeline: turns a fully built prompt into a
/// reply string or a live chunk stream.
#[async_trait]
pub trait ChatPipeline: Send + Sync {
    /// Model identifier, recorded when transcripts are persisted.
    fn model_id(&self) -> &str;

    /// One-shot completion.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Streaming completion.
    ///
    /// Implementations observe `cancel` cooperatively and stop emitting
    /// once it trips; they must not buffer past a cancelled emission
    /// point.
    async fn stream(&self, prompt: &str, cancel: CancellationToken) -> Result<ChunkStream>;
}

/// Retrieval subsystem producing context snippets for a query.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Up to `limit` snippets relevant to `query`, best first.
    async fn retrieve(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<String>>;
}

/// Retriever that returns no context; chat degrades to a plain
/// conversation prompt.
pub struct NoRetrieval;

#[async_trait]
impl ContextRetriever for NoRetrieval {
    async fn retrieve(&self, _user_id: &str, _query: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
