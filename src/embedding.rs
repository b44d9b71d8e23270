//! Embedding provider abstraction and vector utilities.
//!
//! - **[`DisabledProvider`]** refuses to embed; the SQLite store then ranks
//!   with FTS5 BM25 instead of cosine similarity.
//! - **[`OllamaProvider`]** calls `POST {host}/api/embed` with batching,
//!   retry, and backoff.
//!
//! Vectors are stored as little-endian `f32` BLOBs ([`vec_to_blob`],
//! [`blob_to_vec`]) and compared with [`cosine_similarity`].
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - Other HTTP errors → fail immediately
//! - Network errors → retry

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed `texts`, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Ollama Provider ============

/// Embedding provider backed by a local Ollama server.
pub struct OllamaProvider {
    host: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let embedding = &config.embedding;
        let model = embedding
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for ollama provider"))?;
        let dims = embedding
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for ollama provider"))?;
        let host = embedding
            .host
            .clone()
            .unwrap_or_else(|| config.llm.host.clone());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(embedding.timeout_secs))
            .build()?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            model,
            dims,
            batch_size: embedding.batch_size.max(1),
            max_retries: embedding.max_retries,
            client,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.host);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbedResponse = response.json().await?;
                        if parsed.embeddings.len() != texts.len() {
                            bail!(
                                "Ollama returned {} embeddings for {} inputs",
                                parsed.embeddings.len(),
                                texts.len()
                            );
                        }
                        return Ok(parsed.embeddings);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("Ollama embed error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("Ollama embed error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

/// Create the provider selected by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &Config) -> Result<Box<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_layout() {
        let v = vec![1.0f32, -2.5, 3.125];
        let blob = vec_to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(blob_to_vec(&blob), v);
    }

    #[test]
    fn test_cosine() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_refuses() {
        let provider = create_provider(&Config::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert!(embed_query(provider.as_ref(), "hello").await.is_err());
    }

    #[test]
    fn test_ollama_provider_requires_model() {
        let mut config = Config::default();
        config.embedding.provider = "ollama".into();
        assert!(create_provider(&config).is_err());

        config.embedding.model = Some("nomic-embed-text".into());
        config.embedding.dims = Some(768);
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dims(), 768);
    }
}
