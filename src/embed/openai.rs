use async_trait::async_trait;
use serde::Deserialize;

use super::{EmbedError, Embedder};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_MODEL: &str = "text-embedding-ada-002";

/// Embedder backed by the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    /// Requests fail with `NotConfigured` while this is unset.
    api_key: Option<String>,
    model: String,
    url: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Result<Self, EmbedError> {
        if api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; similarity requests will fail");
        }
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            url: EMBEDDINGS_URL.to_string(),
        })
    }
}

/// The embeddings endpoint is sensitive to newlines; flatten them.
fn prepare_input(text: &str) -> String {
    text.replace('\n', " ")
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EmbedError::NotConfigured("OPENAI_API_KEY is not set".to_string())
        })?;
        let body = serde_json::json!({
            "model": self.model,
            "input": [prepare_input(text)],
        });

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Api { status: status.as_u16(), body });
        }

        let parsed: EmbeddingResponse = resp.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::InvalidResponse("missing data[0].embedding".into()))
    }
}
