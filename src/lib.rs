//! # answersmith
//!
//! Retrieval-augmented support assistant: a question comes in, relevant
//! knowledge-base chunks come back out of a persisted vector index, and a
//! language model composes an answer grounded in them, delivered whole or
//! as an incremental frame stream, with an optional advisory classification
//! of the question.
//!
//! ```text
//! ChunkSource ──► SqliteChunkIndex::build ─┐
//!                                          ├─► AnswerEngine (build-or-load, once)
//! persisted store ──► SqliteChunkIndex::load ─┘        │
//!                                                      ▼
//! question ──► AnswerPipeline: Retrieving ─► (Classifying) ─► Generating
//!                                  │                              │
//!                                  ▼                              ├─► PipelineState
//!                              Retriever                          └─► StreamFrame relay
//! ```
//!
//! The engine owns the shared singletons (index + backends) behind a
//! one-shot warm-up guard; every request runs its own short-lived
//! [`pipeline::AnswerPipeline`] over those handles. Persisting the finished
//! exchange is the caller's job; the pipeline never writes to a durable
//! store.
//!
//! Deterministic mock backends ([`embedding::MockEmbeddingProvider`],
//! [`completion::MockCompletionModel`]) are exported so the whole flow can
//! be exercised offline.

pub mod chunk;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod pipeline;
pub mod relay;
pub mod retriever;

pub use chunk::{Chunk, ChunkSource, StaticSource, TextFileSource};
pub use completion::{CompletionError, CompletionModel, MockCompletionModel, OpenAiChatModel};
pub use config::EngineConfig;
pub use embedding::{EmbeddingError, EmbeddingProvider, MockEmbeddingProvider, OpenAiEmbeddings};
pub use engine::{AnswerEngine, WarmUpError};
pub use index::{IndexError, ScoredChunk, SqliteChunkIndex};
pub use pipeline::{AnswerPipeline, CLASSIFICATION_UNAVAILABLE, PipelineError, PipelineState, Stage};
pub use relay::{FrameStream, StreamFrame};
pub use retriever::{DEFAULT_TOP_K, RetrieveError, Retriever};
