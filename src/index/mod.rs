//! The persisted embedding index.
//!
//! One index lives at one `backing_store_path` for the process lifetime.
//! It is either **built** from a full chunk batch and persisted, or
//! **loaded** from a prior persisted state, never observed half-made:
//!
//! ```text
//! ChunkSource ──► build(chunks) ──► embed all ──► single transaction ──► disk
//!                                      │
//!                                      └─ any failure: nothing persisted
//!
//! disk ──► load(path) ──► Some(index) | None (nothing persisted there)
//!
//! index ──► query(vector, k) ──► chunks ordered by descending similarity
//! ```
//!
//! Queries run against immutable data and are safe to share across
//! concurrent requests; [`add`](sqlite::SqliteChunkIndex::add) exists for
//! incremental ingestion off the hot path.

pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::Chunk;
use crate::embedding::EmbeddingError;

pub use sqlite::SqliteChunkIndex;

/// A retrieved chunk with its similarity to the query vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query vector (1.0 = identical direction).
    pub score: f32,
}

/// Errors raised by the embedding index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// `build` was handed zero chunks.
    #[error("cannot build an index from an empty chunk sequence")]
    EmptyBuild,

    /// The embedding backend failed during build, add, or query embedding.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// A query hit an index holding zero entries.
    #[error("query against an index with no entries")]
    Empty,

    /// The query vector does not match the index's dimension.
    #[error("vector dimension mismatch: index stores {expected}, got {actual}")]
    Dimension {
        /// Dimension recorded at build time.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// The backing store failed or holds something that is not an index.
    #[error("index storage error: {0}")]
    Storage(String),
}
