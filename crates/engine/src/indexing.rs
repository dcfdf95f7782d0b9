//! Document indexing processor
//!
//! Runs one indexing pass: chunk the extracted pages, embed the chunks in
//! batches, write chunk records and vectors, and move the document to
//! `completed`. Any failure or cancellation resolves the document to
//! `failed` - never a silent `completed`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ddq_common::config::AppConfig;
use ddq_common::credentials::{CredentialProvider, ProviderFactory};
use ddq_common::errors::{EngineError, Result};
use ddq_common::index::{VectorEntry, VectorIndex};
use ddq_common::metrics;
use ddq_common::models::{ChunkRecord, DocumentRecord, ExtractedPage, ProcessingStatus};
use ddq_common::store::Store;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::jobs::JobContext;
use crate::retry::with_retries;

/// Summary of a completed indexing pass
#[derive(Debug, Clone)]
pub struct IndexingOutcome {
    pub document_id: Uuid,
    pub chunks_indexed: usize,
}

/// Indexing pipeline: chunk, embed, store
pub struct IndexingProcessor {
    store: Arc<dyn Store>,
    index: Arc<dyn VectorIndex>,
    credentials: Arc<dyn CredentialProvider>,
    providers: Arc<dyn ProviderFactory>,
    config: AppConfig,
}

impl IndexingProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn VectorIndex>,
        credentials: Arc<dyn CredentialProvider>,
        providers: Arc<dyn ProviderFactory>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            index,
            credentials,
            providers,
            config,
        }
    }

    /// Process one document. The failure path marks the document `failed`
    /// before propagating the error.
    #[instrument(skip(self, pages, ctx), fields(document_id = %document_id))]
    pub async fn process(
        &self,
        document_id: Uuid,
        pages: Vec<ExtractedPage>,
        ctx: &JobContext,
    ) -> Result<IndexingOutcome> {
        let document = self
            .store
            .document(document_id)
            .await?
            .ok_or_else(|| EngineError::not_found("document", document_id))?;

        self.store
            .update_document_status(document_id, ProcessingStatus::Processing, None)
            .await?;

        match self.run(&document, pages, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // A canceled or failed pass must never read as completed
                if let Err(status_err) = self
                    .store
                    .update_document_status(document_id, ProcessingStatus::Failed, None)
                    .await
                {
                    warn!(error = %status_err, "Failed to mark document as failed");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        document: &DocumentRecord,
        pages: Vec<ExtractedPage>,
        ctx: &JobContext,
    ) -> Result<IndexingOutcome> {
        let started = Instant::now();
        let namespace = document.namespace();

        ctx.check_cancelled()?;
        ctx.set_progress("chunking", 0, 0);

        let chunker = Chunker::new(&self.config.chunking);
        let drafts = chunker.chunk_pages(&pages);

        if drafts.is_empty() {
            return Err(EngineError::validation(
                "no text extracted from document pages",
            ));
        }

        let total = drafts.len() as u32;
        ctx.set_progress("embedding", 0, total);

        let api_key = self
            .credentials
            .credential(document.tenant_id)
            .await?
            .ok_or(EngineError::CredentialMissing {
                tenant_id: document.tenant_id,
            })?;
        let embedder = self.providers.embedder(&api_key)?;

        let retry_attempts = self.config.worker.max_retries;
        let retry_delay = Duration::from_millis(self.config.worker.retry_initial_delay_ms);

        let mut chunks: Vec<ChunkRecord> = Vec::with_capacity(drafts.len());
        let mut entries: Vec<VectorEntry> = Vec::with_capacity(drafts.len());
        let mut embedded = 0u32;

        for batch in drafts.chunks(self.config.embedding.batch_size.max(1)) {
            // Cancellation is honored at the provider-call suspension points
            ctx.check_cancelled()?;

            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let vectors = with_retries(retry_attempts, retry_delay, || {
                embedder.embed_batch(&texts)
            })
            .await
            .inspect_err(|_| {
                metrics::record_embedding(embedder.model_name(), texts.len(), false);
            })?;
            metrics::record_embedding(embedder.model_name(), texts.len(), true);

            for (draft, vector) in batch.iter().zip(vectors.into_iter()) {
                let chunk_id = Uuid::new_v4();
                entries.push(VectorEntry {
                    chunk_id,
                    document_id: document.id,
                    chunk_index: draft.chunk_index,
                    vector,
                });
                chunks.push(ChunkRecord {
                    id: chunk_id,
                    document_id: document.id,
                    chunk_index: draft.chunk_index,
                    text: draft.text.clone(),
                    page_number: Some(draft.page_number),
                    char_offset_start: draft.char_offset_start,
                    char_offset_end: draft.char_offset_end,
                    token_count: draft.token_count,
                    content_hash: draft.content_hash.clone(),
                    vector_id: chunk_id.to_string(),
                    extra: serde_json::Value::Null,
                });
            }

            embedded += batch.len() as u32;
            ctx.set_progress("embedding", embedded, total);
        }

        ctx.check_cancelled()?;
        ctx.set_progress("indexing", embedded, total);

        let chunk_count = chunks.len();
        self.store.insert_chunks(chunks).await?;
        self.index.upsert(namespace, entries).await?;

        self.store
            .update_document_status(
                document.id,
                ProcessingStatus::Completed,
                Some(chunk_count as u32),
            )
            .await?;

        metrics::record_indexing(
            started.elapsed().as_secs_f64(),
            chunk_count,
            &document.tenant_id.to_string(),
        );

        info!(
            namespace = %namespace,
            chunks = chunk_count,
            "Document indexed"
        );

        Ok(IndexingOutcome {
            document_id: document.id,
            chunks_indexed: chunk_count,
        })
    }
}
