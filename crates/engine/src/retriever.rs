//! Vector retrieval over the indexed corpus
//!
//! Embeds the question once, queries the namespace partition, and resolves
//! hits back to full chunk records through the store.

use std::sync::Arc;

use ddq_common::embeddings::Embedder;
use ddq_common::errors::{EngineError, Result};
use ddq_common::index::VectorIndex;
use ddq_common::models::{ChunkRecord, Namespace};
use ddq_common::store::Store;
use tracing::{debug, warn};

/// A chunk returned from retrieval, with its similarity to the question
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: ChunkRecord,
    pub similarity: f64,
}

/// Question-to-chunks retriever
pub struct Retriever {
    store: Arc<dyn Store>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(store: Arc<dyn Store>, index: Arc<dyn VectorIndex>) -> Self {
        Self { store, index }
    }

    /// Retrieve the top-k chunks for a question.
    ///
    /// Returns [`EngineError::EmptyCorpus`] when the namespace holds no
    /// vectors at all; callers must surface "no documents indexed" instead
    /// of attempting generation.
    pub async fn retrieve(
        &self,
        namespace: Namespace,
        question_text: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if question_text.trim().is_empty() {
            return Err(EngineError::validation("question text is empty"));
        }

        // Checked before embedding so an unanswerable question costs no
        // provider call.
        if self.index.len(namespace).await? == 0 {
            return Err(EngineError::EmptyCorpus {
                namespace: namespace.to_string(),
            });
        }

        let query_vector = embedder.embed(question_text).await?;
        let hits = self.index.query(namespace, &query_vector, k).await?;

        let mut retrieved = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.chunk(hit.chunk_id).await? {
                Some(chunk) => retrieved.push(RetrievedChunk {
                    chunk,
                    similarity: hit.similarity,
                }),
                None => {
                    // Index and store can briefly disagree while a document
                    // is being deleted; a dangling hit is dropped.
                    warn!(chunk_id = %hit.chunk_id, "Indexed chunk missing from store, skipping");
                }
            }
        }

        debug!(
            namespace = %namespace,
            requested = k,
            returned = retrieved.len(),
            "Retrieval complete"
        );

        Ok(retrieved)
    }
}
