//! In-memory [`Store`] implementation.
//!
//! Reference implementation of the persistence contract, also used by the
//! engine's test suites. All tables live behind a single `RwLock` so that
//! cascading operations are atomic with respect to readers; writers for
//! different documents do not conflict beyond lock contention.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::models::{
    AnswerRecord, AnswerVersionRecord, ChunkRecord, CitationRecord, DocumentRecord, Namespace,
    ProcessingStatus, QuestionRecord, QuestionStatus,
};

use super::Store;

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, DocumentRecord>,
    chunks: HashMap<Uuid, ChunkRecord>,
    questions: HashMap<Uuid, QuestionRecord>,
    /// Keyed by question id: at most one current answer per question
    answers: HashMap<Uuid, AnswerRecord>,
    citations: HashMap<Uuid, Vec<CitationRecord>>,
    versions: HashMap<Uuid, Vec<AnswerVersionRecord>>,
}

/// In-memory store for tests and embedded use
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn lock_poisoned() -> EngineError {
        EngineError::Storage {
            message: "store lock poisoned".to_string(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_document(&self, document: DocumentRecord) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        if tables.documents.contains_key(&document.id) {
            return Err(EngineError::Conflict {
                message: format!("document {} already exists", document.id),
            });
        }
        tables.documents.insert(document.id, document);
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables.documents.get(&id).cloned())
    }

    async fn document_by_hash(
        &self,
        namespace: Namespace,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables
            .documents
            .values()
            .find(|d| d.namespace() == namespace && d.content_hash == content_hash)
            .cloned())
    }

    async fn documents_for_project(&self, namespace: Namespace) -> Result<Vec<DocumentRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        let mut documents: Vec<DocumentRecord> = tables
            .documents
            .values()
            .filter(|d| d.namespace() == namespace)
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.created_at);
        Ok(documents)
    }

    async fn update_document_status(
        &self,
        id: Uuid,
        status: ProcessingStatus,
        chunk_count: Option<u32>,
    ) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        let document = tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("document", id))?;
        document.processing_status = status;
        if let Some(count) = chunk_count {
            document.chunk_count = count;
        }
        if matches!(
            status,
            ProcessingStatus::Completed | ProcessingStatus::Failed
        ) {
            document.processed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        if tables.documents.remove(&id).is_none() {
            return Err(EngineError::not_found("document", id));
        }
        tables.chunks.retain(|_, c| c.document_id != id);
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        for chunk in &chunks {
            let duplicate = tables.chunks.values().any(|existing| {
                existing.document_id == chunk.document_id
                    && existing.chunk_index == chunk.chunk_index
            });
            if duplicate {
                return Err(EngineError::Conflict {
                    message: format!(
                        "chunk index {} already exists for document {}",
                        chunk.chunk_index, chunk.document_id
                    ),
                });
            }
        }
        for chunk in chunks {
            tables.chunks.insert(chunk.id, chunk);
        }
        Ok(())
    }

    async fn chunk(&self, id: Uuid) -> Result<Option<ChunkRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables.chunks.get(&id).cloned())
    }

    async fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<ChunkRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        let mut chunks: Vec<ChunkRecord> = tables
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn insert_question(&self, question: QuestionRecord) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        if tables.questions.contains_key(&question.id) {
            return Err(EngineError::Conflict {
                message: format!("question {} already exists", question.id),
            });
        }
        tables.questions.insert(question.id, question);
        Ok(())
    }

    async fn question(&self, id: Uuid) -> Result<Option<QuestionRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables.questions.get(&id).cloned())
    }

    async fn questions_for_project(&self, namespace: Namespace) -> Result<Vec<QuestionRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        let mut questions: Vec<QuestionRecord> = tables
            .questions
            .values()
            .filter(|q| q.namespace() == namespace)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.created_at);
        Ok(questions)
    }

    async fn update_question_status(&self, id: Uuid, status: QuestionStatus) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        let question = tables
            .questions
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("question", id))?;
        question.status = status;
        Ok(())
    }

    async fn delete_question(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        if tables.questions.remove(&id).is_none() {
            return Err(EngineError::not_found("question", id));
        }
        if let Some(answer) = tables.answers.remove(&id) {
            tables.citations.remove(&answer.id);
            tables.versions.remove(&answer.id);
        }
        Ok(())
    }

    async fn upsert_answer(&self, answer: AnswerRecord) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        if let Some(existing) = tables.answers.get(&answer.question_id) {
            if existing.id != answer.id {
                return Err(EngineError::Conflict {
                    message: format!(
                        "question {} already has current answer {}",
                        answer.question_id, existing.id
                    ),
                });
            }
        }
        tables.answers.insert(answer.question_id, answer);
        Ok(())
    }

    async fn answer(&self, id: Uuid) -> Result<Option<AnswerRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables.answers.values().find(|a| a.id == id).cloned())
    }

    async fn answer_for_question(&self, question_id: Uuid) -> Result<Option<AnswerRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables.answers.get(&question_id).cloned())
    }

    async fn replace_citations(
        &self,
        answer_id: Uuid,
        citations: Vec<CitationRecord>,
    ) -> Result<()> {
        let mut orders: Vec<u32> = citations.iter().map(|c| c.citation_order).collect();
        orders.sort_unstable();
        for (i, order) in orders.iter().enumerate() {
            if *order != (i + 1) as u32 {
                return Err(EngineError::Conflict {
                    message: format!(
                        "citation order for answer {} is not dense 1..{}",
                        answer_id,
                        citations.len()
                    ),
                });
            }
        }
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        tables.citations.insert(answer_id, citations);
        Ok(())
    }

    async fn citations_for_answer(&self, answer_id: Uuid) -> Result<Vec<CitationRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        let mut citations = tables
            .citations
            .get(&answer_id)
            .cloned()
            .unwrap_or_default();
        citations.sort_by_key(|c| c.citation_order);
        Ok(citations)
    }

    async fn citation_count_for_document(&self, document_id: Uuid) -> Result<usize> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables
            .citations
            .values()
            .flatten()
            .filter(|c| c.document_id == document_id)
            .count())
    }

    async fn append_version(&self, version: AnswerVersionRecord) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Self::lock_poisoned())?;
        let history = tables.versions.entry(version.answer_id).or_default();
        let expected = history.len() as u32 + 1;
        if version.version_number != expected {
            return Err(EngineError::Conflict {
                message: format!(
                    "version {} out of sequence for answer {} (expected {})",
                    version.version_number, version.answer_id, expected
                ),
            });
        }
        history.push(version);
        Ok(())
    }

    async fn versions_for_answer(&self, answer_id: Uuid) -> Result<Vec<AnswerVersionRecord>> {
        let tables = self.tables.read().map_err(|_| Self::lock_poisoned())?;
        Ok(tables.versions.get(&answer_id).cloned().unwrap_or_default())
    }
}
