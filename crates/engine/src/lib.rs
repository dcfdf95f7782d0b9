//! DDQ Answer Engine
//!
//! Retrieval-augmented answering over indexed due-diligence documents:
//! - Chunking of extracted page text into overlapping passages
//! - Tenant/project-isolated vector retrieval
//! - Grounded answer generation with inline citation markers
//! - Citation linking back to retrieved chunks
//! - Multi-metric confidence scoring
//! - Answer review lifecycle with immutable version history
//! - Ground-truth evaluation (BLEU, ROUGE, semantic similarity)
//!
//! [`AnswerEngine`] is the facade the surrounding product consumes; the
//! individual pipeline stages are public for embedding and testing.

pub mod chunker;
pub mod citations;
pub mod confidence;
pub mod engine;
pub mod evaluation;
pub mod generation;
pub mod indexing;
pub mod jobs;
pub mod retriever;
pub mod retry;
pub mod review;
pub mod synthesizer;

pub use chunker::{ChunkDraft, Chunker};
pub use citations::{CitationLinker, LinkedCitations};
pub use confidence::{ConfidenceReport, ConfidenceScorer};
pub use engine::AnswerEngine;
pub use evaluation::{EvaluationEngine, EvaluationReport};
pub use generation::{GenerationOutcome, GenerationProcessor};
pub use indexing::{IndexingOutcome, IndexingProcessor};
pub use jobs::{JobKind, JobProgress, JobRegistry, JobSnapshot, JobState};
pub use retriever::{RetrievedChunk, Retriever};
pub use review::{ReviewAction, ReviewOutcome, ReviewStateMachine};
pub use synthesizer::Synthesizer;
