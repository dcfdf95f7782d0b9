//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers. The client carries
//! no retry policy of its own: transient failures surface as
//! [`EngineError::Provider`] and the job layer decides whether to retry.

use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest batch accepted in a single call (OpenAI request limit)
pub const MAX_BATCH_SIZE: usize = 2048;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Reject batches the provider would refuse before spending a network call.
fn validate_batch(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(EngineError::validation("embedding batch is empty"));
    }
    if texts.len() > MAX_BATCH_SIZE {
        return Err(EngineError::BatchTooLarge {
            size: texts.len(),
            limit: MAX_BATCH_SIZE,
        });
    }
    if texts.iter().any(|t| t.trim().is_empty()) {
        return Err(EngineError::validation(
            "embedding batch contains an empty text",
        ));
    }
    Ok(())
}

/// OpenAI-compatible embedding client
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
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
    /// Create a new embedder against an OpenAI-compatible endpoint
    pub fn new(
        api_key: String,
        model: String,
        dimension: usize,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            dimension,
            base_url,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Provider {
                message: format!("embedding API error {}: {}", status, body),
            });
        }

        let result: EmbeddingResponse =
            response.json().await.map_err(|e| EngineError::Provider {
                message: format!("failed to parse embedding response: {}", e),
            })?;

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Provider {
                message: "empty embedding response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        validate_batch(texts)?;
        let embeddings = self.request(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(EngineError::Provider {
                message: format!(
                    "embedding count mismatch: {} returned for {} inputs",
                    embeddings.len(),
                    texts.len()
                ),
            });
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic mock embedder for tests.
///
/// Hashes each whitespace token into a bag-of-words vector, so texts that
/// share vocabulary score higher cosine similarity than unrelated texts and
/// repeated calls always agree.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> usize {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(token.as_bytes());
        let mut value = [0u8; 8];
        value.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(value) as usize) % self.dimension
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            vector[self.bucket(token)] += 1.0;
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        validate_batch(texts)?;
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.embed("total revenue in 2024").await.unwrap();
        let b = embedder.embed("total revenue in 2024").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_embedder_ranks_shared_vocabulary_higher() {
        let embedder = MockEmbedder::new(64);
        let query = embedder.embed("total revenue").await.unwrap();
        let related = embedder.embed("revenue for the year").await.unwrap();
        let unrelated = embedder.embed("employee onboarding policy").await.unwrap();

        assert!(
            cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated)
        );
    }

    #[tokio::test]
    async fn test_empty_batch_is_validation_error() {
        let embedder = MockEmbedder::new(64);
        let err = embedder.embed_batch(&[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_blank_text_is_validation_error() {
        let embedder = MockEmbedder::new(64);
        let err = embedder
            .embed_batch(&["  ".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let embedder = MockEmbedder::new(8);
        let texts: Vec<String> = (0..MAX_BATCH_SIZE + 1).map(|i| format!("t{}", i)).collect();
        let err = embedder.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, EngineError::BatchTooLarge { .. }));
    }
}
