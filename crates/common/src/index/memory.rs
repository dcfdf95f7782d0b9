//! In-memory [`VectorIndex`] implementation.
//!
//! Brute-force cosine similarity over per-namespace partitions behind a
//! `std::sync::RwLock`. Suitable for tests, embedded deployments and small
//! corpora; swap in a server-backed implementation for scale.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::models::Namespace;

use super::{cosine_similarity, VectorEntry, VectorHit, VectorIndex};

/// In-memory vector index with structural namespace partitions
pub struct MemoryVectorIndex {
    namespaces: RwLock<HashMap<Namespace, Vec<VectorEntry>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    fn lock_poisoned() -> EngineError {
        EngineError::Storage {
            message: "vector index lock poisoned".to_string(),
        }
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, namespace: Namespace, entries: Vec<VectorEntry>) -> Result<()> {
        let mut namespaces = self.namespaces.write().map_err(|_| Self::lock_poisoned())?;
        let partition = namespaces.entry(namespace).or_default();
        for entry in entries {
            partition.retain(|existing| existing.chunk_id != entry.chunk_id);
            partition.push(entry);
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        let namespaces = self.namespaces.read().map_err(|_| Self::lock_poisoned())?;
        let partition = match namespaces.get(&namespace) {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };

        let mut scored: Vec<(&VectorEntry, f64)> = partition
            .iter()
            .map(|entry| (entry, cosine_similarity(vector, &entry.vector)))
            .collect();

        // Descending similarity; equal scores fall back to chunk order so
        // results are repeatable across runs.
        scored.sort_by(|(ea, sa), (eb, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ea.chunk_index.cmp(&eb.chunk_index))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(entry, similarity)| VectorHit {
                chunk_id: entry.chunk_id,
                similarity,
            })
            .collect())
    }

    async fn remove_document(&self, namespace: Namespace, document_id: Uuid) -> Result<()> {
        let mut namespaces = self.namespaces.write().map_err(|_| Self::lock_poisoned())?;
        if let Some(partition) = namespaces.get_mut(&namespace) {
            partition.retain(|entry| entry.document_id != document_id);
        }
        Ok(())
    }

    async fn drop_namespace(&self, namespace: Namespace) -> Result<()> {
        let mut namespaces = self.namespaces.write().map_err(|_| Self::lock_poisoned())?;
        namespaces.remove(&namespace);
        tracing::info!(namespace = %namespace, "Dropped vector namespace");
        Ok(())
    }

    async fn len(&self, namespace: Namespace) -> Result<usize> {
        let namespaces = self.namespaces.read().map_err(|_| Self::lock_poisoned())?;
        Ok(namespaces.get(&namespace).map(|p| p.len()).unwrap_or(0))
    }
}
