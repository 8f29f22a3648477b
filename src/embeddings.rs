//! Embedding clients.
//!
//! Embedding inference is a black box that turns text or image bytes into a
//! fixed-length float vector over HTTP. The traits are the seam the
//! services depend on; tests substitute deterministic embedders.

use anyhow::{Context, Result};
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};

/// Produces document/query embeddings for text retrieval.
pub trait TextEmbedder: Send + Sync {
    fn embed_document(
        &self,
        title: &str,
        text: &str,
    ) -> impl Future<Output = Result<Vec<f32>>> + Send;

    fn embed_query(&self, query: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Produces embeddings in a joint image/text space for image retrieval.
pub trait ImageEmbedder: Send + Sync {
    fn embed_image(&self, bytes: &[u8]) -> impl Future<Output = Result<Vec<f32>>> + Send;

    fn embed_text(&self, query: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Client for an OpenAI-compatible embeddings API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&serde_json::json!({
                "model": self.model,
                "input": input,
            }))
            .send()
            .await
            .context("Failed to call embeddings API")?
            .error_for_status()
            .context("Embeddings API returned error")?
            .json::<EmbeddingResponse>()
            .await
            .context("Failed to parse embeddings response")?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("No embedding returned")
    }
}

impl TextEmbedder for HttpEmbedder {
    async fn embed_document(&self, title: &str, text: &str) -> Result<Vec<f32>> {
        let prompt = if title.trim().is_empty() {
            format!("search_document: {text}")
        } else {
            format!("search_document: {title}\n{text}")
        };
        self.embed(&prompt).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(&format!("search_query: {query}")).await
    }
}

impl ImageEmbedder for HttpEmbedder {
    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.embed(&encoded).await
    }

    async fn embed_text(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
    }
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
