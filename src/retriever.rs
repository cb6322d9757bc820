//! Fixed-`k` read-only retrieval over the embedding index.

use std::sync::Arc;

use thiserror::Error;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::{IndexError, ScoredChunk, SqliteChunkIndex};

/// Default number of chunks pulled per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Errors raised while retrieving context for a question.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Embedding the question failed.
    #[error("failed to embed question: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The index query failed (including the zero-entry index case).
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Thin view over an index fixed to a result count.
///
/// Holds only shared immutable handles, so one retriever serves every
/// concurrent request without locking.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<SqliteChunkIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl Retriever {
    /// Retriever over `index` using `provider` for question vectors.
    ///
    /// `provider` must be the same backend the index was built with.
    pub fn new(index: Arc<SqliteChunkIndex>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            provider,
            k: DEFAULT_TOP_K,
        }
    }

    /// Override the result count (minimum 1).
    #[must_use]
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// The configured result count.
    pub fn top_k(&self) -> usize {
        self.k
    }

    /// The shared index handle.
    pub fn index(&self) -> &Arc<SqliteChunkIndex> {
        &self.index
    }

    /// Embed `question` and return its top-`k` chunks, best match first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>, RetrieveError> {
        let vector = self.provider.embed(question).await?;
        let hits = self.index.query(&vector, self.k).await?;
        tracing::debug!(hits = hits.len(), k = self.k, "retrieved context");
        Ok(hits)
    }
}
