//! The request pipeline: `Start → Retrieving → (Classifying) → Generating → Done`.
//!
//! # Execution model
//!
//! 1. `Retrieving` always runs first: the question is embedded and the
//!    top-`k` chunks populate [`PipelineState::context`]. Failure here is
//!    fatal for the request.
//! 2. `Classifying` runs only when the caller asked for it. Its prompt holds
//!    the raw question (no retrieved context) and its free-text result is
//!    stored verbatim: an advisory label, not a closed taxonomy. Failure is
//!    non-fatal: the sentinel [`CLASSIFICATION_UNAVAILABLE`] is recorded and
//!    the pipeline continues.
//! 3. `Generating` builds the grounded prompt and asks the completion
//!    backend for the answer (whole-message or delta stream). Failure is
//!    fatal.
//!
//! Straight-line, no retries, no loops back; the only branch is whether
//! classification runs at all.

mod prompts;
mod state;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::completion::{CompletionError, CompletionModel};
use crate::engine::WarmUpError;
use crate::relay::{self, FrameStream};
use crate::retriever::{RetrieveError, Retriever};

pub use state::PipelineState;

/// Sentinel recorded when the classification stage degrades.
pub const CLASSIFICATION_UNAVAILABLE: &str = "unclassified";

/// The pipeline stages a fatal error can be attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Index warm-up and context retrieval.
    Retrieving,
    /// Optional question classification.
    Classifying,
    /// Grounded answer generation.
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Retrieving => "retrieving",
            Stage::Classifying => "classifying",
            Stage::Generating => "generating",
        };
        f.write_str(label)
    }
}

/// A fatal stage failure, handed to the caller without partial results.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The shared index could not be initialised.
    #[error("retrieving stage failed during warm-up: {0}")]
    WarmUp(#[source] WarmUpError),

    /// Context retrieval failed.
    #[error("retrieving stage failed: {0}")]
    Retrieving(#[source] RetrieveError),

    /// Answer generation failed.
    #[error("generating stage failed: {0}")]
    Generating(#[source] CompletionError),
}

impl PipelineError {
    /// The stage the failure occurred in.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::WarmUp(_) | PipelineError::Retrieving(_) => Stage::Retrieving,
            PipelineError::Generating(_) => Stage::Generating,
        }
    }
}

/// One request-scoped execution over shared, read-only handles.
///
/// Cheap to construct per request; the expensive state (index, backends)
/// lives behind the `Arc`s and is owned by the engine.
#[derive(Clone)]
pub struct AnswerPipeline {
    retriever: Arc<Retriever>,
    completion: Arc<dyn CompletionModel>,
}

impl AnswerPipeline {
    /// Pipeline over the shared retriever and completion backend.
    pub fn new(retriever: Arc<Retriever>, completion: Arc<dyn CompletionModel>) -> Self {
        Self {
            retriever,
            completion,
        }
    }

    /// Blocking form: run every stage and hand back the finished state.
    ///
    /// The returned state always carries an answer; when classification was
    /// requested it also carries a label (the sentinel if the classifier
    /// degraded).
    pub async fn run(
        &self,
        question: &str,
        want_classification: bool,
    ) -> Result<PipelineState, PipelineError> {
        let mut state = PipelineState::new(question);

        state.context = self
            .retriever
            .retrieve(question)
            .await
            .map_err(PipelineError::Retrieving)?;

        if want_classification {
            state.classification = Some(self.classify(question).await);
        }

        let prompt = prompts::grounded_answer(&state.context, question);
        let answer = self
            .completion
            .complete(&prompt)
            .await
            .map_err(PipelineError::Generating)?;
        state.answer = Some(answer);
        Ok(state)
    }

    /// Streaming form: the answer arrives as a frame stream.
    ///
    /// Any failure before the first delta (retrieval included) becomes the
    /// stream's single terminal `Error` frame, so streaming callers always
    /// observe zero or more `Delta` frames followed by exactly one terminal
    /// frame.
    pub async fn run_stream(&self, question: &str) -> FrameStream {
        let context = match self.retriever.retrieve(question).await {
            Ok(context) => context,
            Err(err) => {
                let err = PipelineError::Retrieving(err);
                tracing::warn!(stage = %err.stage(), error = %err, "streaming request failed");
                return relay::failed(err.to_string());
            }
        };
        let prompt = prompts::grounded_answer(&context, question);
        match self.completion.stream(&prompt).await {
            Ok(upstream) => relay::frame_stream(upstream),
            Err(err) => {
                let err = PipelineError::Generating(err);
                tracing::warn!(stage = %err.stage(), error = %err, "streaming request failed");
                relay::failed(err.to_string())
            }
        }
    }

    /// Classification is degradable: a backend failure records the sentinel
    /// instead of aborting the request.
    async fn classify(&self, question: &str) -> String {
        match self.completion.complete(&prompts::classification(question)).await {
            Ok(label) => label,
            Err(err) => {
                tracing::warn!(
                    stage = %Stage::Classifying,
                    error = %err,
                    "classification degraded; continuing to generation",
                );
                CLASSIFICATION_UNAVAILABLE.to_string()
            }
        }
    }
}
