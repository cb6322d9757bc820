//! Chunk values and the sources that supply them.
//!
//! A [`Chunk`] is the unit of retrieval: a bounded span of knowledge-base
//! text together with where it came from. Chunks are immutable once
//! produced; the index stores copies and never mutates them.
//!
//! A [`ChunkSource`] hands the index builder a finite, already-ordered
//! batch. Parsing heterogeneous document formats is a collaborator's job;
//! the only built-in sources are an in-memory batch for tests and demos and
//! a plain-text file splitter for the common single-file knowledge base.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A bounded span of source text used as the unit of retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier for this chunk.
    pub id: String,
    /// Identifier of the document or source the chunk was cut from.
    pub source_id: String,
    /// Zero-based position of this chunk within its source.
    pub seq: usize,
    /// The chunk text.
    pub text: String,
}

impl Chunk {
    /// Create a chunk with a fresh id.
    pub fn new(source_id: impl Into<String>, seq: usize, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            seq,
            text: text.into(),
        }
    }

    /// Create a chunk with a caller-supplied id (useful for deterministic tests).
    pub fn with_id(
        id: impl Into<String>,
        source_id: impl Into<String>,
        seq: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            seq,
            text: text.into(),
        }
    }
}

/// Errors raised while producing chunks.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing file could not be read.
    #[error("failed to read chunk source {path}: {source}")]
    Io {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source produced no usable text.
    #[error("chunk source {0} contained no text")]
    EmptySource(String),
}

/// Supplies the finite chunk batch the index is built from.
///
/// Consumed only at index-build time; the request hot path never touches a
/// source.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Produce the full, ordered chunk batch.
    async fn chunks(&self) -> Result<Vec<Chunk>, SourceError>;
}

/// In-memory chunk batch, for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    chunks: Vec<Chunk>,
}

impl StaticSource {
    /// Wrap an existing batch.
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Build a batch from bare strings, assigning sequential positions.
    pub fn from_texts(source_id: &str, texts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let chunks = texts
            .into_iter()
            .enumerate()
            .map(|(seq, text)| Chunk::new(source_id, seq, text))
            .collect();
        Self { chunks }
    }
}

#[async_trait]
impl ChunkSource for StaticSource {
    async fn chunks(&self) -> Result<Vec<Chunk>, SourceError> {
        Ok(self.chunks.clone())
    }
}

/// Splits one UTF-8 text file into overlapping, character-bounded chunks.
///
/// Paragraph boundaries (blank lines) are preferred split points; a
/// paragraph longer than `max_chars` is cut mid-text. Consecutive chunks
/// share `overlap_chars` characters of context.
#[derive(Clone, Debug)]
pub struct TextFileSource {
    path: PathBuf,
    max_chars: usize,
    overlap_chars: usize,
}

impl TextFileSource {
    /// Default chunk budget in characters.
    pub const DEFAULT_MAX_CHARS: usize = 250;
    /// Default overlap between consecutive chunks.
    pub const DEFAULT_OVERLAP: usize = 100;

    /// Source over `path` with the default chunking parameters.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_chars: Self::DEFAULT_MAX_CHARS,
            overlap_chars: Self::DEFAULT_OVERLAP,
        }
    }

    /// Override the chunk budget.
    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    /// Override the overlap. Clamped below `max_chars`.
    #[must_use]
    pub fn with_overlap(mut self, overlap_chars: usize) -> Self {
        self.overlap_chars = overlap_chars;
        self
    }

    fn split(&self, text: &str) -> Vec<String> {
        let overlap = self.overlap_chars.min(self.max_chars.saturating_sub(1));
        let mut pieces: Vec<String> = Vec::new();
        let mut window = String::new();

        let mut flush = |window: &mut String, pieces: &mut Vec<String>| {
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                pieces.push(trimmed.to_string());
            }
            // Carry the tail of the previous window as shared context.
            let tail: String = tail_chars(window, overlap);
            window.clear();
            window.push_str(&tail);
        };

        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if !window.is_empty()
                && window.chars().count() + 1 + paragraph.chars().count() > self.max_chars
            {
                flush(&mut window, &mut pieces);
            }
            if !window.is_empty() {
                window.push('\n');
            }
            // A single oversized paragraph is cut mid-text.
            let mut remaining = paragraph;
            loop {
                let room = self.max_chars.saturating_sub(window.chars().count());
                if remaining.chars().count() <= room {
                    window.push_str(remaining);
                    break;
                }
                let cut = char_boundary(remaining, room.max(1));
                window.push_str(&remaining[..cut]);
                remaining = &remaining[cut..];
                flush(&mut window, &mut pieces);
            }
        }
        let trimmed = window.trim();
        if !trimmed.is_empty() && pieces.last().map(String::as_str) != Some(trimmed) {
            pieces.push(trimmed.to_string());
        }
        pieces
    }
}

fn tail_chars(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(count)).collect()
}

fn char_boundary(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(idx, _)| idx)
}

#[async_trait]
impl ChunkSource for TextFileSource {
    async fn chunks(&self) -> Result<Vec<Chunk>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let source_id = self.path.display().to_string();
        let pieces = self.split(&text);
        if pieces.is_empty() {
            return Err(SourceError::EmptySource(source_id));
        }
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(seq, piece)| Chunk::new(&source_id, seq, piece))
            .collect())
    }
}
