//! Credential collaborator contract and provider wiring
//!
//! The engine never stores or decrypts provider credentials itself; it asks
//! the credential collaborator for a usable secret per tenant and treats a
//! missing secret as a hard precondition failure for any provider-backed
//! operation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::embeddings::{Embedder, MockEmbedder, OpenAiEmbedder};
use crate::errors::{EngineError, Result};
use crate::llm::{ChatModel, MockChatModel, OpenAiChatModel};

/// Secret-retrieval collaborator.
///
/// Returns `Ok(None)` when the tenant has no usable credential configured;
/// callers map that to [`EngineError::CredentialMissing`].
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self, tenant_id: Uuid) -> Result<Option<String>>;
}

/// In-memory credential source for tests and embedded deployments
pub struct StaticCredentials {
    keys: RwLock<HashMap<Uuid, String>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, tenant_id: Uuid, key: impl Into<String>) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(tenant_id, key.into());
        }
    }
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credential(&self, tenant_id: Uuid) -> Result<Option<String>> {
        let keys = self.keys.read().map_err(|_| EngineError::Storage {
            message: "credential lock poisoned".to_string(),
        })?;
        Ok(keys.get(&tenant_id).cloned())
    }
}

/// Builds per-tenant provider clients from a resolved credential
pub trait ProviderFactory: Send + Sync {
    fn embedder(&self, api_key: &str) -> Result<Arc<dyn Embedder>>;

    /// Model used for grounded answer generation
    fn generation_model(&self, api_key: &str) -> Result<Arc<dyn ChatModel>>;

    /// Model used for faithfulness/relevancy judging
    fn scoring_model(&self, api_key: &str) -> Result<Arc<dyn ChatModel>>;
}

/// Factory producing OpenAI-compatible clients from configuration
pub struct OpenAiProviderFactory {
    config: AppConfig,
}

impl OpenAiProviderFactory {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for OpenAiProviderFactory {
    fn embedder(&self, api_key: &str) -> Result<Arc<dyn Embedder>> {
        let embedding = &self.config.embedding;
        Ok(Arc::new(OpenAiEmbedder::new(
            api_key.to_string(),
            embedding.model.clone(),
            embedding.dimension,
            embedding.api_base.clone(),
            Duration::from_secs(embedding.timeout_secs),
        )?))
    }

    fn generation_model(&self, api_key: &str) -> Result<Arc<dyn ChatModel>> {
        let generation = &self.config.generation;
        Ok(Arc::new(OpenAiChatModel::new(
            api_key.to_string(),
            generation.endpoint.clone(),
            generation.model.clone(),
            generation.temperature,
            generation.max_tokens,
            Duration::from_secs(generation.timeout_secs),
        )?))
    }

    fn scoring_model(&self, api_key: &str) -> Result<Arc<dyn ChatModel>> {
        let generation = &self.config.generation;
        // Judges run at temperature 0 so repeated scoring is stable
        Ok(Arc::new(OpenAiChatModel::new(
            api_key.to_string(),
            generation.endpoint.clone(),
            generation.scoring_model.clone(),
            0.0,
            64,
            Duration::from_secs(generation.timeout_secs),
        )?))
    }
}

/// Factory handing out fixed mock providers, ignoring the credential
pub struct MockProviderFactory {
    pub embedder: Arc<dyn Embedder>,
    pub generation: Arc<dyn ChatModel>,
    pub scoring: Arc<dyn ChatModel>,
}

impl MockProviderFactory {
    /// Mock factory with a bag-of-words embedder and a fixed answer
    pub fn with_answer(dimension: usize, answer: impl Into<String>) -> Self {
        Self {
            embedder: Arc::new(MockEmbedder::new(dimension)),
            generation: Arc::new(MockChatModel::always(answer)),
            scoring: Arc::new(MockChatModel::always("0.8")),
        }
    }
}

impl ProviderFactory for MockProviderFactory {
    fn embedder(&self, _api_key: &str) -> Result<Arc<dyn Embedder>> {
        Ok(self.embedder.clone())
    }

    fn generation_model(&self, _api_key: &str) -> Result<Arc<dyn ChatModel>> {
        Ok(self.generation.clone())
    }

    fn scoring_model(&self, _api_key: &str) -> Result<Arc<dyn ChatModel>> {
        Ok(self.scoring.clone())
    }
}
