//! The process-wide context object and its one-shot warm-up.
//!
//! [`AnswerEngine`] holds validated, immutable handles to the chunk source,
//! embedding backend, and completion backend, and owns the build-or-load of
//! the shared index. Request handlers borrow the engine; nothing reads
//! process-wide mutable state.
//!
//! Warm-up runs **at most once per process**: the first caller attempts
//! `load(index_path)` and falls back to building from the chunk source when
//! nothing is persisted there. Concurrent first callers wait on the same
//! attempt, and its outcome, success or failure, is cached so every
//! request observes the same result.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;

use crate::chunk::ChunkSource;
use crate::completion::CompletionModel;
use crate::config::EngineConfig;
use crate::embedding::EmbeddingProvider;
use crate::index::SqliteChunkIndex;
use crate::pipeline::{AnswerPipeline, PipelineError, PipelineState};
use crate::relay::FrameStream;
use crate::retriever::Retriever;

/// Warm-up failure, cached and shared between waiting requests.
///
/// Carries rendered messages rather than source errors so that one failure
/// can be observed by every concurrent caller.
#[derive(Clone, Debug, Error)]
pub enum WarmUpError {
    /// A persisted index exists but could not be opened.
    #[error("failed to load persisted index: {0}")]
    Load(String),

    /// The chunk source could not produce the build batch.
    #[error("chunk source failed: {0}")]
    Source(String),

    /// Building the index from the chunk batch failed.
    #[error("failed to build index: {0}")]
    Build(String),
}

type WarmUp = Result<Arc<Retriever>, WarmUpError>;

/// Shared handles plus the lazily initialised retriever singleton.
pub struct AnswerEngine {
    config: EngineConfig,
    source: Arc<dyn ChunkSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionModel>,
    warm: OnceCell<WarmUp>,
}

impl AnswerEngine {
    /// Engine over explicit backend handles. No work happens until the
    /// first request (or an explicit [`warm_up`](Self::warm_up)).
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ChunkSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            config,
            source,
            embedder,
            completion,
            warm: OnceCell::new(),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Force initialisation now instead of on the first request.
    pub async fn warm_up(&self) -> Result<(), WarmUpError> {
        self.retriever().await.map(|_| ())
    }

    /// The shared retriever, initialising it build-or-load on first use.
    pub async fn retriever(&self) -> WarmUp {
        self.warm
            .get_or_init(|| async { self.initialise().await })
            .await
            .clone()
    }

    async fn initialise(&self) -> WarmUp {
        let index = match SqliteChunkIndex::load(&self.config.index_path).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                tracing::info!(
                    path = %self.config.index_path.display(),
                    "no persisted index found; building from chunk source",
                );
                let chunks = self
                    .source
                    .chunks()
                    .await
                    .map_err(|err| WarmUpError::Source(err.to_string()))?;
                SqliteChunkIndex::build(&self.config.index_path, self.embedder.as_ref(), chunks)
                    .await
                    .map_err(|err| WarmUpError::Build(err.to_string()))?
            }
            Err(err) => return Err(WarmUpError::Load(err.to_string())),
        };
        let retriever = Retriever::new(Arc::new(index), self.embedder.clone())
            .with_top_k(self.config.top_k);
        Ok(Arc::new(retriever))
    }

    /// Blocking form: `(answer, classification?)` or a typed error.
    pub async fn run(
        &self,
        question: &str,
        want_classification: bool,
    ) -> Result<PipelineState, PipelineError> {
        let retriever = self.retriever().await.map_err(PipelineError::WarmUp)?;
        self.pipeline(retriever)
            .run(question, want_classification)
            .await
    }

    /// Streaming form: a frame stream ending in exactly one terminal frame.
    ///
    /// Warm-up failure surfaces as the stream's single `Error` frame, like
    /// any other pre-delta failure.
    pub async fn run_stream(&self, question: &str) -> FrameStream {
        match self.retriever().await {
            Ok(retriever) => self.pipeline(retriever).run_stream(question).await,
            Err(err) => {
                let err = PipelineError::WarmUp(err);
                tracing::warn!(stage = %err.stage(), error = %err, "streaming request failed");
                crate::relay::failed(err.to_string())
            }
        }
    }

    fn pipeline(&self, retriever: Arc<Retriever>) -> AnswerPipeline {
        AnswerPipeline::new(retriever, self.completion.clone())
    }
}
