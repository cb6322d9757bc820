//! OpenAI-compatible chat-completions client, blocking and streaming.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{CompletionError, CompletionModel, CompletionStream};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat client for OpenAI-compatible endpoints.
///
/// `complete` waits for the whole message; `stream` requests server-sent
/// events and yields `delta.content` fragments as they arrive. Neither call
/// retries; failures surface to the pipeline immediately.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiChatModel {
    /// Build a client against `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(CompletionError::Transport("missing completion API key".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {api_key}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| CompletionError::Transport("invalid completion API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|err| CompletionError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }

    /// Client configured from `COMPLETION_API_KEY`, `COMPLETION_BASE_URL`,
    /// and `COMPLETION_MODEL`.
    pub fn from_env() -> Result<Self, CompletionError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("COMPLETION_API_KEY")
            .map_err(|_| CompletionError::Transport("COMPLETION_API_KEY is not set".into()))?;
        let base_url = std::env::var("COMPLETION_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var("COMPLETION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Self::new(&api_key, &base_url, model)
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            stream,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl CompletionModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let response = self.send(prompt, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Malformed(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::Malformed("response carried no choices".into()))
    }

    async fn stream(&self, prompt: &str) -> Result<CompletionStream, CompletionError> {
        let response = self.send(prompt, true).await?;
        let bytes: BoxStream<'static, Result<Vec<u8>, CompletionError>> = response
            .bytes_stream()
            .map(|item| {
                item.map(|chunk| chunk.to_vec())
                    .map_err(|err| CompletionError::Interrupted(err.to_string()))
            })
            .boxed();
        Ok(sse_delta_stream(bytes))
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, CompletionError>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, CompletionError>>,
    finished: bool,
}

/// Turn an SSE byte stream into a delta stream.
///
/// `data:` payloads carry incremental chat chunks until the `[DONE]`
/// sentinel. An end-of-stream without `[DONE]` is a backend fault and is
/// reported as [`CompletionError::Interrupted`], never swallowed.
fn sse_delta_stream(bytes: BoxStream<'static, Result<Vec<u8>, CompletionError>>) -> CompletionStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    drain_lines(&mut state);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    return Some((
                        Err(CompletionError::Interrupted(
                            "stream ended before completion".into(),
                        )),
                        state,
                    ));
                }
            }
        }
    })
    .boxed()
}

/// Split complete lines out of the buffer and queue any deltas they carry.
fn drain_lines(state: &mut SseState) {
    while let Some(newline) = state.buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = state.buffer.drain(..=newline).collect();
        let line = match std::str::from_utf8(&line) {
            Ok(text) => text.trim(),
            Err(err) => {
                state.pending
                    .push_back(Err(CompletionError::Malformed(err.to_string())));
                return;
            }
        };
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload == "[DONE]" {
            state.finished = true;
            return;
        }
        match serde_json::from_str::<ChatStreamChunk>(payload) {
            Ok(chunk) => {
                let delta = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content);
                if let Some(delta) = delta
                    && !delta.is_empty()
                {
                    state.pending.push_back(Ok(delta));
                }
            }
            Err(err) => {
                state.pending
                    .push_back(Err(CompletionError::Malformed(err.to_string())));
                return;
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
