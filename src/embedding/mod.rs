//! Embedding backends.
//!
//! The index and the retriever both speak to an [`EmbeddingProvider`]:
//! `embed(text) → fixed-length vector`. The same provider (and therefore the
//! same model) must be used at build time and at query time, or similarity
//! scores stop meaning anything. The index records its vector dimension and
//! rejects mismatched queries, but it cannot detect a *different* model of
//! the same dimension.
//!
//! [`MockEmbeddingProvider`] is exported for tests and demos: it is
//! deterministic, and lexical overlap between texts correlates with cosine
//! similarity of their vectors, which is enough to exercise retrieval
//! ordering without a model server.

pub mod http;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use thiserror::Error;

pub use http::OpenAiEmbeddings;

/// Errors raised by embedding backends.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The request never produced a usable response.
    #[error("embedding request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("embedding backend returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        body: String,
    },

    /// The response arrived but could not be interpreted.
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// `embed(text) → fixed-length numeric vector`.
///
/// Implementations must be deterministic for a given input within one
/// process lifetime and must always return vectors of one fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&input.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("backend returned no vectors".into()))
    }
}

/// Deterministic, offline embedding provider for tests and demos.
///
/// Each lowercased word is hashed into one of `dimension` buckets; the
/// resulting term-count vector is L2-normalised. Texts sharing words land
/// near each other under cosine similarity.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    /// Default vector dimension for the mock.
    pub const DEFAULT_DIMENSION: usize = 64;

    /// Provider with the default dimension.
    pub fn new() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }

    /// Provider with a custom dimension (minimum 4).
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(4),
        }
    }

    fn embed_one(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in input
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            // Empty text still needs a valid unit vector.
            vector[0] = 1.0;
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(inputs.iter().map(|input| self.embed_one(input)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn mock_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let inputs = vec![
            "Hello world".to_string(),
            "Goodbye world".to_string(),
            "Hello world".to_string(),
        ];
        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn lexical_overlap_raises_similarity() {
        let provider = MockEmbeddingProvider::new();
        let question = provider.embed("my vpn is broken").await.unwrap();
        let on_topic = provider.embed("reset vpn via portal x").await.unwrap();
        let off_topic = provider.embed("quarterly catering budget").await.unwrap();
        assert!(cosine(&question, &on_topic) > cosine(&question, &off_topic));
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let provider = MockEmbeddingProvider::with_dimension(16);
        let vector = provider.embed("some words here").await.unwrap();
        assert_eq!(vector.len(), 16);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
