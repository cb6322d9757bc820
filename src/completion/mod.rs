//! The completion contract: `complete(prompt) → text` and
//! `stream(prompt) → deltas`.
//!
//! Backends are external and swappable; the pipeline only depends on
//! [`CompletionModel`]. A streaming call yields deltas in emission order, is
//! finite, and is not restartable: re-invoking `stream` re-invokes the
//! backend. A backend fault mid-stream surfaces as an `Err` item so that the
//! relay can terminate the wire stream explicitly instead of going silent.

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use openai::OpenAiChatModel;

/// Lazy sequence of text deltas from a completion backend.
pub type CompletionStream = BoxStream<'static, Result<String, CompletionError>>;

/// Errors raised by completion backends.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request never produced a usable response (connect, timeout, ...).
    #[error("completion request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("completion backend returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        body: String,
    },

    /// The response arrived but could not be interpreted.
    #[error("malformed completion response: {0}")]
    Malformed(String),

    /// The delta stream broke after it had started.
    #[error("completion stream interrupted: {0}")]
    Interrupted(String),
}

/// Abstraction over a language-model backend.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Generate the full completion for `prompt`.
    ///
    /// Never resolves to a partially generated string: any failure is an
    /// error, not a truncated success.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Open a delta stream for `prompt`.
    async fn stream(&self, prompt: &str) -> Result<CompletionStream, CompletionError>;
}

type ReplyFn = dyn Fn(&str) -> Result<String, CompletionError> + Send + Sync;

/// Scripted completion backend for tests and demos.
///
/// Replies come from a fixed string or a handler closure inspecting the
/// prompt; `fail_when` makes only matching prompts fail, which is how the
/// classification-degradation path is exercised. `break_stream_after`
/// injects a mid-stream fault after the given number of deltas.
#[derive(Clone)]
pub struct MockCompletionModel {
    reply: Arc<ReplyFn>,
    fail_matching: Option<String>,
    break_stream_after: Option<usize>,
}

impl MockCompletionModel {
    /// Always answer with `reply`.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            reply: Arc::new(move |_| Ok(reply.clone())),
            fail_matching: None,
            break_stream_after: None,
        }
    }

    /// Answer by running `handler` over the full prompt.
    pub fn with_handler(
        handler: impl Fn(&str) -> Result<String, CompletionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Arc::new(handler),
            fail_matching: None,
            break_stream_after: None,
        }
    }

    /// Fail any call whose prompt contains `needle`.
    #[must_use]
    pub fn fail_when(mut self, needle: impl Into<String>) -> Self {
        self.fail_matching = Some(needle.into());
        self
    }

    /// Make `stream` yield an error after `deltas` successful items.
    #[must_use]
    pub fn break_stream_after(mut self, deltas: usize) -> Self {
        self.break_stream_after = Some(deltas);
        self
    }

    fn respond(&self, prompt: &str) -> Result<String, CompletionError> {
        if let Some(needle) = &self.fail_matching
            && prompt.contains(needle.as_str())
        {
            return Err(CompletionError::Transport(format!(
                "scripted failure for prompts containing '{needle}'"
            )));
        }
        (self.reply)(prompt)
    }
}

#[async_trait]
impl CompletionModel for MockCompletionModel {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.respond(prompt)
    }

    async fn stream(&self, prompt: &str) -> Result<CompletionStream, CompletionError> {
        let reply = self.respond(prompt)?;
        let mut items: Vec<Result<String, CompletionError>> = reply
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        if let Some(break_after) = self.break_stream_after {
            items.truncate(break_after);
            items.push(Err(CompletionError::Interrupted(
                "scripted mid-stream failure".into(),
            )));
        }
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}
