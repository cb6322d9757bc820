//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Embeddings client for OpenAI-compatible endpoints.
///
/// Failures surface immediately; retry policy, if any, belongs to the
/// transport layer above the pipeline.
#[derive(Clone)]
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbeddings {
    /// Build a client against `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(EmbeddingError::Transport("missing embeddings API key".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {api_key}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbeddingError::Transport("invalid embeddings API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|err| EmbeddingError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }

    /// Client configured from `EMBEDDINGS_API_KEY`, `EMBEDDINGS_BASE_URL`,
    /// and `EMBEDDINGS_MODEL`.
    pub fn from_env() -> Result<Self, EmbeddingError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("EMBEDDINGS_API_KEY")
            .map_err(|_| EmbeddingError::Transport("EMBEDDINGS_API_KEY is not set".into()))?;
        let base_url = std::env::var("EMBEDDINGS_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("EMBEDDINGS_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        Self::new(&api_key, &base_url, model)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| EmbeddingError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Malformed(err.to_string()))?;
        parsed.data.sort_by_key(|row| row.index);
        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingError::Malformed(format!(
                "backend returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}
