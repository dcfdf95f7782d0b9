//! Domain models for the DDQ answer engine
//!
//! Records here are the persisted shapes the [`crate::store::Store`]
//! contract operates on. Tenant and project identifiers are threaded
//! explicitly through every record and operation; there is no ambient
//! tenant context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use validator::Validate;

/// Tenant/project partition all engine data is scoped to.
///
/// Isolation is structural: the namespace is part of every storage key,
/// never a metadata filter that could be forgotten on a query path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub tenant_id: Uuid,
    pub project_id: Uuid,
}

impl Namespace {
    pub fn new(tenant_id: Uuid, project_id: Uuid) -> Self {
        Self {
            tenant_id,
            project_id,
        }
    }

    /// Short collection-style name for logging: `t_{first8}_p_{first8}`
    pub fn collection_name(&self) -> String {
        let tenant = self.tenant_id.simple().to_string();
        let project = self.project_id.simple().to_string();
        format!("t_{}_p_{}", &tenant[..8], &project[..8])
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.collection_name())
    }
}

/// Document processing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

/// Question lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Processing,
    Draft,
    Review,
    Approved,
    Rejected,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Pending => "pending",
            QuestionStatus::Processing => "processing",
            QuestionStatus::Draft => "draft",
            QuestionStatus::Review => "review",
            QuestionStatus::Approved => "approved",
            QuestionStatus::Rejected => "rejected",
        }
    }
}

/// Answer review lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Edited,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Draft => "draft",
            AnswerStatus::PendingReview => "pending_review",
            AnswerStatus::Approved => "approved",
            AnswerStatus::Rejected => "rejected",
            AnswerStatus::Edited => "edited",
        }
    }

    /// Approved and rejected answers accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnswerStatus::Approved | AnswerStatus::Rejected)
    }

    /// An edited answer re-enters review; approve/reject remain legal.
    pub fn is_reviewable(&self) -> bool {
        matches!(self, AnswerStatus::PendingReview | AnswerStatus::Edited)
    }
}

/// Kind of change captured by an [`AnswerVersionRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Approve,
    Reject,
    Edit,
    Regenerate,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Approve => "approve",
            ChangeType::Reject => "reject",
            ChangeType::Edit => "edit",
            ChangeType::Regenerate => "regenerate",
        }
    }
}

/// Source document identity and processing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub filename: String,
    pub content_hash: String,
    pub processing_status: ProcessingStatus,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.tenant_id, self.project_id)
    }
}

/// A bounded passage of document text, the unit of retrieval.
///
/// `(document_id, chunk_index)` is unique; the index defines a total order
/// in document reading order. Chunks are immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: u32,
    pub text: String,
    pub page_number: Option<u32>,
    pub char_offset_start: usize,
    pub char_offset_end: usize,
    pub token_count: u32,
    pub content_hash: String,
    pub vector_id: String,
    /// Narrow extension point for collaborator-specific annotations
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Questionnaire question with optional human-authored reference answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub text: String,
    pub category: Option<String>,
    pub number: Option<String>,
    pub ground_truth_answer: Option<String>,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
}

impl QuestionRecord {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.tenant_id, self.project_id)
    }
}

/// The single current answer for a question.
///
/// Prior states live only as [`AnswerVersionRecord`] snapshots; `version`
/// always equals the snapshot count plus one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub is_ai_generated: bool,
    pub confidence_score: Option<f64>,
    pub retrieval_score: Option<f64>,
    pub faithfulness_score: Option<f64>,
    pub relevancy_score: Option<f64>,
    pub coverage_score: Option<f64>,
    pub status: AnswerStatus,
    pub version: u32,
    pub reviewed_by: Option<Uuid>,
    pub review_notes: Option<String>,
    /// True when faithfulness/relevancy judging fell back to neutral 0.5
    pub degraded_scoring: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Link from an answer to the chunk that grounds one of its claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationRecord {
    pub id: Uuid,
    pub answer_id: Uuid,
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub page_number: Option<u32>,
    pub relevance_score: f64,
    /// Dense 1..N rank by first occurrence of the marker in the answer text
    pub citation_order: u32,
    pub excerpt: String,
}

/// Immutable snapshot written on every review transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerVersionRecord {
    pub id: Uuid,
    pub answer_id: Uuid,
    pub version_number: u32,
    pub content_snapshot: String,
    pub diff_from_previous: Option<String>,
    pub change_type: ChangeType,
    pub changed_by: Option<Uuid>,
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Page of extracted text handed to the chunker by the
/// text-extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub text: String,
}

/// Input for registering a document
#[derive(Debug, Clone, Validate)]
pub struct NewDocument {
    pub namespace: Namespace,
    #[validate(length(min = 1, max = 500))]
    pub filename: String,
    #[validate(length(min = 1))]
    pub content_hash: String,
}

/// Input for creating a question
#[derive(Debug, Clone, Validate)]
pub struct NewQuestion {
    pub namespace: Namespace,
    #[validate(length(min = 1))]
    pub text: String,
    pub category: Option<String>,
    pub number: Option<String>,
    pub ground_truth_answer: Option<String>,
}

/// Short content hash: first 16 hex chars of SHA-256
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)[..16].to_string()
}
