//! Configuration management for the DDQ engine
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation (chat model) configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Background worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Target chunk size in whitespace tokens
    #[serde(default = "default_chunk_tokens")]
    pub max_tokens: usize,

    /// Overlap between consecutive chunks in whitespace tokens
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// API base URL (OpenAI-compatible)
    #[serde(default = "default_embedding_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Texts per embedding request
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// API endpoint for chat completions (OpenAI-compatible)
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,

    /// Model used for answer generation
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Model used for faithfulness/relevancy judging
    #[serde(default = "default_scoring_model")]
    pub scoring_model: String,

    /// Sampling temperature for answer generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum citation excerpt length in characters
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Similarity threshold for the coverage sub-score
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Number of concurrent job workers
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Queue capacity before submissions block
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum retry attempts for transient provider errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_initial_delay_ms: u64,
}

// Default value functions
fn default_chunk_tokens() -> usize { 512 }
fn default_overlap_tokens() -> usize { 100 }
fn default_embedding_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_provider_timeout() -> u64 { 30 }
fn default_embed_batch_size() -> usize { 100 }
fn default_chat_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_generation_model() -> String { crate::DEFAULT_GENERATION_MODEL.to_string() }
fn default_scoring_model() -> String { crate::DEFAULT_SCORING_MODEL.to_string() }
fn default_temperature() -> f32 { 0.1 }
fn default_max_tokens() -> usize { 1000 }
fn default_excerpt_chars() -> usize { 200 }
fn default_top_k() -> usize { 5 }
fn default_relevance_threshold() -> f64 { 0.7 }
fn default_worker_count() -> usize { 2 }
fn default_queue_capacity() -> usize { 64 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 100 }

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_chunk_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: default_embedding_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_provider_timeout(),
            batch_size: default_embed_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            model: default_generation_model(),
            scoring_model: default_scoring_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout(),
            excerpt_max_chars: default_excerpt_chars(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__TOP_K=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Get the generation request timeout as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.chunking.max_tokens, 512);
        assert_eq!(config.chunking.overlap_tokens, 100);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn test_scoring_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.generation.scoring_model, "gpt-4o-mini");
        assert!((config.retrieval.relevance_threshold - 0.7).abs() < f64::EPSILON);
    }
}
