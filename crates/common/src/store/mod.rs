//! Persistence contract for the DDQ answer engine
//!
//! The engine talks to storage exclusively through the [`Store`] trait; the
//! data-model invariants are enforced at this boundary regardless of the
//! backing implementation:
//! - `(document_id, chunk_index)` is unique and chunks are immutable
//! - one current answer row per question
//! - answer version snapshots are dense, starting at 1
//! - citation order is a dense 1..N sequence per answer

mod memory;

pub use memory::MemoryStore;

use crate::errors::Result;
use crate::models::{
    AnswerRecord, AnswerVersionRecord, ChunkRecord, CitationRecord, DocumentRecord, Namespace,
    ProcessingStatus, QuestionRecord, QuestionStatus,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Data access contract for all engine records
#[async_trait]
pub trait Store: Send + Sync {
    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Insert a new document record
    async fn insert_document(&self, document: DocumentRecord) -> Result<()>;

    /// Find document by ID
    async fn document(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    /// Find a document in a namespace by content hash (idempotent re-upload)
    async fn document_by_hash(
        &self,
        namespace: Namespace,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>>;

    /// Documents in a project, in creation order
    async fn documents_for_project(&self, namespace: Namespace) -> Result<Vec<DocumentRecord>>;

    /// Update processing status; `chunk_count` is set when provided
    async fn update_document_status(
        &self,
        id: Uuid,
        status: ProcessingStatus,
        chunk_count: Option<u32>,
    ) -> Result<()>;

    /// Delete a document and cascade its chunks.
    ///
    /// Callers are responsible for the citation policy check; the store
    /// itself only cascades ownership.
    async fn delete_document(&self, id: Uuid) -> Result<()>;

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    /// Insert the chunk set for one processing pass.
    ///
    /// Rejects duplicate `(document_id, chunk_index)` pairs with a conflict.
    async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()>;

    /// Find chunk by ID
    async fn chunk(&self, id: Uuid) -> Result<Option<ChunkRecord>>;

    /// All chunks for a document, ordered by `chunk_index`
    async fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<ChunkRecord>>;

    // ========================================================================
    // Question Operations
    // ========================================================================

    /// Insert a new question record
    async fn insert_question(&self, question: QuestionRecord) -> Result<()>;

    /// Find question by ID
    async fn question(&self, id: Uuid) -> Result<Option<QuestionRecord>>;

    /// Questions in a project, in creation order
    async fn questions_for_project(&self, namespace: Namespace) -> Result<Vec<QuestionRecord>>;

    /// Update question lifecycle status
    async fn update_question_status(&self, id: Uuid, status: QuestionStatus) -> Result<()>;

    /// Delete a question and cascade its answer, citations and versions
    async fn delete_question(&self, id: Uuid) -> Result<()>;

    // ========================================================================
    // Answer Operations
    // ========================================================================

    /// Insert or replace the single current answer row.
    ///
    /// Keyed by `question_id`: at most one current answer exists per
    /// question, and an upsert with a different answer id for the same
    /// question is rejected.
    async fn upsert_answer(&self, answer: AnswerRecord) -> Result<()>;

    /// Find answer by ID
    async fn answer(&self, id: Uuid) -> Result<Option<AnswerRecord>>;

    /// The current answer for a question
    async fn answer_for_question(&self, question_id: Uuid) -> Result<Option<AnswerRecord>>;

    // ========================================================================
    // Citation Operations
    // ========================================================================

    /// Replace the citation set for an answer.
    ///
    /// Rejects sets whose `citation_order` is not a dense 1..N sequence.
    async fn replace_citations(
        &self,
        answer_id: Uuid,
        citations: Vec<CitationRecord>,
    ) -> Result<()>;

    /// Citations for an answer, ordered by `citation_order`
    async fn citations_for_answer(&self, answer_id: Uuid) -> Result<Vec<CitationRecord>>;

    /// Number of citations (across all answers) referencing a document's
    /// chunks. Drives the cited-document deletion policy.
    async fn citation_count_for_document(&self, document_id: Uuid) -> Result<usize>;

    // ========================================================================
    // Answer Version Operations
    // ========================================================================

    /// Append an immutable version snapshot.
    ///
    /// Rejects a `version_number` that is not exactly `count + 1`, keeping
    /// every version sequence gapless from 1.
    async fn append_version(&self, version: AnswerVersionRecord) -> Result<()>;

    /// Version history for an answer, ordered by `version_number`
    async fn versions_for_answer(&self, answer_id: Uuid) -> Result<Vec<AnswerVersionRecord>>;
}
