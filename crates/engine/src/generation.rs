//! Answer generation processor
//!
//! Runs the full RAG pipeline for one question: retrieve, synthesize, link
//! citations, score confidence, persist. Every failure path resolves the
//! question to a defined status - a question is never left in `processing`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ddq_common::config::AppConfig;
use ddq_common::credentials::{CredentialProvider, ProviderFactory};
use ddq_common::errors::{EngineError, Result};
use ddq_common::index::VectorIndex;
use ddq_common::metrics;
use ddq_common::models::{AnswerRecord, AnswerStatus, QuestionRecord, QuestionStatus};
use ddq_common::store::Store;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::citations::CitationLinker;
use crate::confidence::ConfidenceScorer;
use crate::jobs::JobContext;
use crate::retriever::Retriever;
use crate::retry::with_retries;
use crate::review::ReviewStateMachine;
use crate::synthesizer::Synthesizer;

/// Summary of a completed generation pass
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub question_id: Uuid,
    pub answer_id: Uuid,
    pub citation_count: usize,
    pub confidence: f64,
}

/// Generation pipeline for one question
pub struct GenerationProcessor {
    store: Arc<dyn Store>,
    retriever: Retriever,
    credentials: Arc<dyn CredentialProvider>,
    providers: Arc<dyn ProviderFactory>,
    config: AppConfig,
}

impl GenerationProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn VectorIndex>,
        credentials: Arc<dyn CredentialProvider>,
        providers: Arc<dyn ProviderFactory>,
        config: AppConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(store.clone(), index),
            store,
            credentials,
            providers,
            config,
        }
    }

    /// Generate (or regenerate) the answer for a question.
    ///
    /// On failure the question returns to `pending`; an `EmptyCorpus`
    /// outcome means generation was never attempted.
    #[instrument(skip(self, ctx), fields(question_id = %question_id))]
    pub async fn process(&self, question_id: Uuid, ctx: &JobContext) -> Result<GenerationOutcome> {
        let question = self
            .store
            .question(question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("question", question_id))?;

        self.store
            .update_question_status(question_id, QuestionStatus::Processing)
            .await?;

        match self.run(&question, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(status_err) = self
                    .store
                    .update_question_status(question_id, QuestionStatus::Pending)
                    .await
                {
                    warn!(error = %status_err, "Failed to reset question status");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, question: &QuestionRecord, ctx: &JobContext) -> Result<GenerationOutcome> {
        let started = Instant::now();
        let namespace = question.namespace();

        ctx.check_cancelled()?;
        ctx.set_progress("retrieving", 0, 4);

        let api_key = self
            .credentials
            .credential(question.tenant_id)
            .await?
            .ok_or(EngineError::CredentialMissing {
                tenant_id: question.tenant_id,
            })?;
        let embedder = self.providers.embedder(&api_key)?;
        let generation_model = self.providers.generation_model(&api_key)?;
        let scoring_model = self.providers.scoring_model(&api_key)?;

        let retry_attempts = self.config.worker.max_retries;
        let retry_delay = Duration::from_millis(self.config.worker.retry_initial_delay_ms);
        let top_k = self.config.retrieval.top_k;

        // EmptyCorpus is permanent and passes straight through the retry
        let retrieved = with_retries(retry_attempts, retry_delay, || {
            self.retriever
                .retrieve(namespace, &question.text, embedder.as_ref(), top_k)
        })
        .await?;

        ctx.check_cancelled()?;
        ctx.set_progress("generating", 1, 4);

        let answer_text = with_retries(retry_attempts, retry_delay, || {
            Synthesizer::synthesize(&question.text, &retrieved, generation_model.as_ref())
        })
        .await?;

        ctx.check_cancelled()?;
        ctx.set_progress("scoring", 2, 4);

        // Reuse the current answer row when regenerating; its history keeps
        // the previous text as a version snapshot.
        let existing = self.store.answer_for_question(question.id).await?;
        let answer_id = existing.as_ref().map(|a| a.id).unwrap_or_else(Uuid::new_v4);

        let linker = CitationLinker::new(self.config.generation.excerpt_max_chars);
        let linked = linker.link(answer_id, &answer_text, &retrieved);
        metrics::record_dropped_citations(linked.dropped_markers);

        let scorer = ConfidenceScorer::new(self.config.retrieval.relevance_threshold);
        let confidence = scorer
            .score(
                &question.text,
                &answer_text,
                &retrieved,
                scoring_model.as_ref(),
            )
            .await;

        ctx.set_progress("persisting", 3, 4);

        let now = Utc::now();
        let answer = match existing {
            Some(previous) => {
                let snapshot = ReviewStateMachine::regeneration_snapshot(&previous, &answer_text);
                self.store.append_version(snapshot).await?;
                AnswerRecord {
                    text: answer_text,
                    is_ai_generated: true,
                    confidence_score: Some(confidence.overall),
                    retrieval_score: Some(confidence.retrieval),
                    faithfulness_score: Some(confidence.faithfulness),
                    relevancy_score: Some(confidence.relevancy),
                    coverage_score: Some(confidence.coverage),
                    status: AnswerStatus::PendingReview,
                    version: previous.version + 1,
                    reviewed_by: None,
                    review_notes: None,
                    degraded_scoring: confidence.degraded,
                    updated_at: now,
                    ..previous
                }
            }
            None => AnswerRecord {
                id: answer_id,
                question_id: question.id,
                text: answer_text,
                is_ai_generated: true,
                confidence_score: Some(confidence.overall),
                retrieval_score: Some(confidence.retrieval),
                faithfulness_score: Some(confidence.faithfulness),
                relevancy_score: Some(confidence.relevancy),
                coverage_score: Some(confidence.coverage),
                status: AnswerStatus::PendingReview,
                version: 1,
                reviewed_by: None,
                review_notes: None,
                degraded_scoring: confidence.degraded,
                created_at: now,
                updated_at: now,
            },
        };

        let citation_count = linked.citations.len();
        self.store.upsert_answer(answer).await?;
        self.store
            .replace_citations(answer_id, linked.citations)
            .await?;
        self.store
            .update_question_status(question.id, QuestionStatus::Review)
            .await?;

        metrics::record_generation(
            started.elapsed().as_secs_f64(),
            citation_count,
            &question.tenant_id.to_string(),
        );

        info!(
            namespace = %namespace,
            answer_id = %answer_id,
            citations = citation_count,
            confidence = confidence.overall,
            degraded = confidence.degraded,
            "Answer generated"
        );

        Ok(GenerationOutcome {
            question_id: question.id,
            answer_id,
            citation_count,
            confidence: confidence.overall,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddq_common::credentials::{MockProviderFactory, StaticCredentials};
    use ddq_common::embeddings::MockEmbedder;
    use ddq_common::index::{MemoryVectorIndex, VectorEntry};
    use ddq_common::llm::MockChatModel;
    use ddq_common::models::{ChunkRecord, DocumentRecord, ProcessingStatus};
    use ddq_common::store::MemoryStore;
    use ddq_common::embeddings::Embedder;

    use crate::jobs::{JobKind, JobRegistry};

    struct Fixture {
        store: Arc<MemoryStore>,
        index: Arc<MemoryVectorIndex>,
        credentials: Arc<StaticCredentials>,
        registry: JobRegistry,
        tenant_id: Uuid,
        project_id: Uuid,
        question_id: Uuid,
    }

    impl Fixture {
        fn processor(&self, providers: Arc<dyn ProviderFactory>) -> GenerationProcessor {
            GenerationProcessor::new(
                self.store.clone(),
                self.index.clone(),
                self.credentials.clone(),
                providers,
                AppConfig::default(),
            )
        }

        fn ctx(&self) -> JobContext {
            self.registry
                .create(JobKind::Generation {
                    tenant_id: self.tenant_id,
                    question_id: self.question_id,
                })
                .unwrap()
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryVectorIndex::new());
        let credentials = Arc::new(StaticCredentials::new());

        let tenant_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();
        let question_id = Uuid::new_v4();
        credentials.set(tenant_id, "sk-test");

        store
            .insert_question(QuestionRecord {
                id: question_id,
                tenant_id,
                project_id,
                text: "What is total revenue?".to_string(),
                category: Some("financials".to_string()),
                number: Some("3.1".to_string()),
                ground_truth_answer: None,
                status: QuestionStatus::Pending,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        Fixture {
            store,
            index,
            credentials,
            registry: JobRegistry::new(),
            tenant_id,
            project_id,
            question_id,
        }
    }

    async fn seed_corpus(f: &Fixture, texts: &[&str]) {
        let namespace = ddq_common::models::Namespace::new(f.tenant_id, f.project_id);
        let document_id = Uuid::new_v4();
        let embedder = MockEmbedder::new(32);

        f.store
            .insert_document(DocumentRecord {
                id: document_id,
                tenant_id: f.tenant_id,
                project_id: f.project_id,
                filename: "financials.pdf".to_string(),
                content_hash: "hash".to_string(),
                processing_status: ProcessingStatus::Completed,
                chunk_count: texts.len() as u32,
                created_at: Utc::now(),
                processed_at: Some(Utc::now()),
            })
            .await
            .unwrap();

        let mut chunks = Vec::new();
        let mut entries = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let chunk_id = Uuid::new_v4();
            chunks.push(ChunkRecord {
                id: chunk_id,
                document_id,
                chunk_index: i as u32,
                text: text.to_string(),
                page_number: Some(i as u32 + 1),
                char_offset_start: 0,
                char_offset_end: text.len(),
                token_count: text.split_whitespace().count() as u32,
                content_hash: ddq_common::models::short_hash(text),
                vector_id: chunk_id.to_string(),
                extra: serde_json::Value::Null,
            });
            entries.push(VectorEntry {
                chunk_id,
                document_id,
                chunk_index: i as u32,
                vector: embedder.embed(text).await.unwrap(),
            });
        }
        f.store.insert_chunks(chunks).await.unwrap();
        f.index.upsert(namespace, entries).await.unwrap();
    }

    #[tokio::test]
    async fn test_full_pipeline_persists_answer_and_citations() {
        let f = fixture().await;
        seed_corpus(&f, &["Total revenue was $50M in fiscal 2024."]).await;

        let providers = Arc::new(MockProviderFactory::with_answer(
            32,
            "Revenue is $50M [1].",
        ));
        let processor = f.processor(providers);
        let outcome = processor.process(f.question_id, &f.ctx()).await.unwrap();

        assert_eq!(outcome.citation_count, 1);

        let question = f.store.question(f.question_id).await.unwrap().unwrap();
        assert_eq!(question.status, QuestionStatus::Review);

        let answer = f
            .store
            .answer_for_question(f.question_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer.status, AnswerStatus::PendingReview);
        assert_eq!(answer.version, 1);
        assert!(answer.is_ai_generated);
        assert!(answer.confidence_score.unwrap() > 0.0);
        assert!(!answer.degraded_scoring);

        let citations = f.store.citations_for_answer(answer.id).await.unwrap();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].citation_order, 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_leaves_question_pending() {
        let f = fixture().await;
        // No documents indexed at all

        let providers = Arc::new(MockProviderFactory::with_answer(32, "unreachable"));
        let processor = f.processor(providers);
        let err = processor.process(f.question_id, &f.ctx()).await.unwrap_err();
        assert!(matches!(err, EngineError::EmptyCorpus { .. }));

        let question = f.store.question(f.question_id).await.unwrap().unwrap();
        assert_eq!(question.status, QuestionStatus::Pending);
        // Generation was never attempted, so no answer exists
        assert!(f
            .store
            .answer_for_question(f.question_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_credential_is_a_hard_precondition() {
        let f = fixture().await;
        seed_corpus(&f, &["Some indexed content."]).await;

        // A credential source that knows nothing about this tenant
        let processor = GenerationProcessor::new(
            f.store.clone(),
            f.index.clone(),
            Arc::new(StaticCredentials::new()),
            Arc::new(MockProviderFactory::with_answer(32, "x")),
            AppConfig::default(),
        );

        let err = processor.process(f.question_id, &f.ctx()).await.unwrap_err();
        assert!(matches!(err, EngineError::CredentialMissing { .. }));

        let question = f.store.question(f.question_id).await.unwrap().unwrap();
        assert_eq!(question.status, QuestionStatus::Pending);
    }

    #[tokio::test]
    async fn test_generation_failure_resets_question() {
        let f = fixture().await;
        seed_corpus(&f, &["Some indexed content."]).await;

        let providers = Arc::new(MockProviderFactory {
            embedder: Arc::new(MockEmbedder::new(32)),
            generation: Arc::new(MockChatModel::failing("model down")),
            scoring: Arc::new(MockChatModel::always("0.8")),
        });
        let processor = f.processor(providers);
        let err = processor.process(f.question_id, &f.ctx()).await.unwrap_err();
        assert!(err.is_transient());

        let question = f.store.question(f.question_id).await.unwrap().unwrap();
        assert_eq!(question.status, QuestionStatus::Pending);
    }

    #[tokio::test]
    async fn test_judge_failure_degrades_scores_but_persists_answer() {
        let f = fixture().await;
        seed_corpus(&f, &["Total revenue was $50M."]).await;

        let providers = Arc::new(MockProviderFactory {
            embedder: Arc::new(MockEmbedder::new(32)),
            generation: Arc::new(MockChatModel::always("Revenue is $50M [1].")),
            scoring: Arc::new(MockChatModel::failing("judge down")),
        });
        let processor = f.processor(providers);
        processor.process(f.question_id, &f.ctx()).await.unwrap();

        let answer = f
            .store
            .answer_for_question(f.question_id)
            .await
            .unwrap()
            .unwrap();
        assert!(answer.degraded_scoring);
        assert_eq!(answer.faithfulness_score, Some(0.5));
        assert_eq!(answer.relevancy_score, Some(0.5));
    }

    #[tokio::test]
    async fn test_regeneration_reuses_answer_row_with_history() {
        let f = fixture().await;
        seed_corpus(&f, &["Total revenue was $50M."]).await;

        let first = Arc::new(MockProviderFactory::with_answer(32, "Old answer [1]."));
        let processor = f.processor(first);
        let first_outcome = processor.process(f.question_id, &f.ctx()).await.unwrap();

        let second = Arc::new(MockProviderFactory::with_answer(32, "New answer [1]."));
        let processor = f.processor(second);
        let second_outcome = processor.process(f.question_id, &f.ctx()).await.unwrap();

        // Same current row, bumped version, one regenerate snapshot
        assert_eq!(first_outcome.answer_id, second_outcome.answer_id);
        let answer = f
            .store
            .answer_for_question(f.question_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer.text, "New answer [1].");
        assert_eq!(answer.version, 2);

        let versions = f.store.versions_for_answer(answer.id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(
            versions[0].change_type,
            ddq_common::models::ChangeType::Regenerate
        );
    }

    #[tokio::test]
    async fn test_hallucinated_markers_never_cite_arbitrary_chunks() {
        let f = fixture().await;
        seed_corpus(&f, &["Only one chunk exists."]).await;

        let providers = Arc::new(MockProviderFactory::with_answer(
            32,
            "Claim [1] and invented [9].",
        ));
        let processor = f.processor(providers);
        let outcome = processor.process(f.question_id, &f.ctx()).await.unwrap();
        assert_eq!(outcome.citation_count, 1);
    }
}
