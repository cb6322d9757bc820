//! Per-request pipeline state.

use serde::{Deserialize, Serialize};

use crate::index::ScoredChunk;

/// The record one request carries through the pipeline stages.
///
/// Created fresh per request and owned by exactly one execution: stages
/// extend it in turn, and it is handed back (or dropped) when the request
/// finishes. `classification` and `answer` stay `None` until their stages
/// run; a returned state from a successful blocking run always has `answer`
/// set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineState {
    /// The raw user question.
    pub question: String,
    /// Retrieved context, best match first.
    pub context: Vec<ScoredChunk>,
    /// Advisory free-text support category, if requested.
    pub classification: Option<String>,
    /// The generated answer.
    pub answer: Option<String>,
}

impl PipelineState {
    /// Fresh state for `question`; everything else starts unset.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: Vec::new(),
            classification: None,
            answer: None,
        }
    }

    /// The retrieved chunk texts, in retrieval order.
    pub fn context_texts(&self) -> Vec<&str> {
        self.context
            .iter()
            .map(|scored| scored.chunk.text.as_str())
            .collect()
    }
}
