//! DDQ Common Library
//!
//! Shared code for the DDQ answer engine including:
//! - Domain models and status enums
//! - Storage contract and in-memory reference store
//! - Tenant/project-scoped vector index
//! - Embedding and chat-model provider clients
//! - Credential collaborator contract
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod credentials;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{EngineError, Result};
pub use index::VectorIndex;
pub use llm::ChatModel;
pub use models::Namespace;
pub use store::Store;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default generation model
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-4o";

/// Default model for faithfulness/relevancy judging
pub const DEFAULT_SCORING_MODEL: &str = "gpt-4o-mini";
