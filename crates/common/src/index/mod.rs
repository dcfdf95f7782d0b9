//! Tenant/project-scoped vector index
//!
//! Isolation is structural: every operation addresses a [`Namespace`]
//! partition, never a shared collection narrowed by a metadata filter. A
//! query against a namespace that was never written returns an empty result.

mod memory;

pub use memory::MemoryVectorIndex;

use crate::errors::Result;
use crate::models::Namespace;
use async_trait::async_trait;
use uuid::Uuid;

/// A vector stored for one chunk
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    /// Used for deterministic tie-breaking on equal similarity
    pub chunk_index: u32,
    pub vector: Vec<f32>,
}

/// A ranked query hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: Uuid,
    pub similarity: f64,
}

/// Nearest-neighbor store mapping vectors to chunk identities
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace vectors in a namespace
    async fn upsert(&self, namespace: Namespace, entries: Vec<VectorEntry>) -> Result<()>;

    /// Top-k cosine similarity search, descending; ties broken by lower
    /// `chunk_index`. Empty/nonexistent namespaces yield an empty Vec.
    async fn query(&self, namespace: Namespace, vector: &[f32], k: usize)
        -> Result<Vec<VectorHit>>;

    /// Remove all vectors belonging to a document
    async fn remove_document(&self, namespace: Namespace, document_id: Uuid) -> Result<()>;

    /// Drop an entire namespace (project deletion)
    async fn drop_namespace(&self, namespace: Namespace) -> Result<()>;

    /// Number of vectors stored in a namespace
    async fn len(&self, namespace: Namespace) -> Result<usize>;
}

/// Cosine similarity between two vectors; 0.0 for mismatched or zero-length
/// inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if mag_a < f64::EPSILON || mag_b < f64::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
