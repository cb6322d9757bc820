//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use answersmith::chunk::{Chunk, ChunkSource, SourceError, StaticSource};
use answersmith::completion::MockCompletionModel;
use answersmith::config::EngineConfig;
use answersmith::embedding::MockEmbeddingProvider;
use answersmith::engine::AnswerEngine;

/// The knowledge base from the retrieval scenario: two VPN chunks.
pub fn vpn_chunks() -> Vec<Chunk> {
    vec![
        Chunk::with_id("vpn-portal", "kb", 0, "Reset VPN via portal X"),
        Chunk::with_id("vpn-network", "kb", 1, "Contact network team for VPN issues"),
    ]
}

/// Chunk source that counts how many times the batch was pulled.
pub struct CountingSource {
    inner: StaticSource,
    calls: AtomicUsize,
    fail: bool,
}

impl CountingSource {
    pub fn new(chunks: Vec<Chunk>) -> Arc<Self> {
        Arc::new(Self {
            inner: StaticSource::new(chunks),
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    /// A source whose every pull fails, for failed-warm-up tests.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            inner: StaticSource::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkSource for CountingSource {
    async fn chunks(&self) -> Result<Vec<Chunk>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::EmptySource("scripted failure".into()));
        }
        self.inner.chunks().await
    }
}

/// Index path inside a per-test temp dir (the dir guard must stay alive).
pub fn temp_index_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("index.db")
}

/// Engine over mock backends with its index in `dir`.
pub fn engine_with(
    dir: &tempfile::TempDir,
    source: Arc<CountingSource>,
    completion: MockCompletionModel,
    top_k: usize,
) -> AnswerEngine {
    let config = EngineConfig::default()
        .with_index_path(temp_index_path(dir))
        .with_top_k(top_k);
    AnswerEngine::new(
        config,
        source,
        Arc::new(MockEmbeddingProvider::new()),
        Arc::new(completion),
    )
}
