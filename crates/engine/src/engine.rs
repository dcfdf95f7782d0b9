//! Engine facade and background work queue
//!
//! [`AnswerEngine`] is the single entry point the surrounding product talks
//! to: document/question management, job submission and polling, review
//! actions and ground-truth evaluation. Indexing and generation run on a
//! bounded in-process worker pool consuming an mpsc queue; polling the job
//! registry is the only externally visible progress mechanism.
//!
//! At most one generation job per question may be queued or running at a
//! time. A duplicate submission is rejected with `ConcurrencyConflict`
//! before anything is enqueued, so two answers can never race to become
//! current. Indexing submissions are deduplicated per document the same
//! way.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use ddq_common::config::AppConfig;
use ddq_common::credentials::{CredentialProvider, ProviderFactory};
use ddq_common::errors::{EngineError, Result};
use ddq_common::index::VectorIndex;
use ddq_common::metrics;
use ddq_common::models::{
    DocumentRecord, ExtractedPage, Namespace, NewDocument, NewQuestion, ProcessingStatus,
    QuestionRecord, QuestionStatus,
};
use ddq_common::store::Store;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::evaluation::{EvaluationEngine, EvaluationReport};
use crate::generation::GenerationProcessor;
use crate::indexing::IndexingProcessor;
use crate::jobs::{JobContext, JobKind, JobRegistry, JobSnapshot};
use crate::review::{ReviewAction, ReviewOutcome, ReviewStateMachine};

/// Work item carried on the queue
enum JobPayload {
    Indexing {
        document_id: Uuid,
        pages: Vec<ExtractedPage>,
    },
    Generation {
        question_id: Uuid,
    },
}

struct QueuedJob {
    ctx: JobContext,
    payload: JobPayload,
}

struct EngineInner {
    store: Arc<dyn Store>,
    index: Arc<dyn VectorIndex>,
    credentials: Arc<dyn CredentialProvider>,
    providers: Arc<dyn ProviderFactory>,
    registry: JobRegistry,
    indexing: IndexingProcessor,
    generation: GenerationProcessor,
    /// Question ids with a generation job queued or running
    active_generations: Mutex<HashSet<Uuid>>,
    /// Document ids with an indexing job queued or running
    active_indexing: Mutex<HashSet<Uuid>>,
}

impl EngineInner {
    fn release_generation(&self, question_id: Uuid) {
        if let Ok(mut active) = self.active_generations.lock() {
            active.remove(&question_id);
        }
    }

    fn release_indexing(&self, document_id: Uuid) {
        if let Ok(mut active) = self.active_indexing.lock() {
            active.remove(&document_id);
        }
    }

    async fn run_job(&self, job: QueuedJob) {
        let job_id = job.ctx.job_id();
        self.registry.mark_running(job_id);

        let (kind, result) = match job.payload {
            JobPayload::Indexing { document_id, pages } => {
                let result = self
                    .indexing
                    .process(document_id, pages, &job.ctx)
                    .await
                    .map(|_| ());
                self.release_indexing(document_id);
                ("indexing", result)
            }
            JobPayload::Generation { question_id } => {
                let result = self
                    .generation
                    .process(question_id, &job.ctx)
                    .await
                    .map(|_| ());
                self.release_generation(question_id);
                ("generation", result)
            }
        };

        match result {
            Ok(()) => {
                self.registry.mark_succeeded(job_id);
                metrics::record_job(kind, "succeeded");
            }
            Err(e) => {
                self.registry.mark_failed(job_id, &e);
                metrics::record_job(kind, "failed");
                warn!(job_id = %job_id, kind, error = %e, "Background job failed");
            }
        }
    }
}

/// The retrieval-augmented answer engine
pub struct AnswerEngine {
    inner: Arc<EngineInner>,
    config: AppConfig,
    tx: mpsc::Sender<QueuedJob>,
    workers: Vec<JoinHandle<()>>,
}

impl AnswerEngine {
    /// Build the engine and spawn its worker pool.
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn VectorIndex>,
        credentials: Arc<dyn CredentialProvider>,
        providers: Arc<dyn ProviderFactory>,
        config: AppConfig,
    ) -> Self {
        let registry = JobRegistry::new();

        let indexing = IndexingProcessor::new(
            store.clone(),
            index.clone(),
            credentials.clone(),
            providers.clone(),
            config.clone(),
        );
        let generation = GenerationProcessor::new(
            store.clone(),
            index.clone(),
            credentials.clone(),
            providers.clone(),
            config.clone(),
        );

        let inner = Arc::new(EngineInner {
            store,
            index,
            credentials,
            providers,
            registry,
            indexing,
            generation,
            active_generations: Mutex::new(HashSet::new()),
            active_indexing: Mutex::new(HashSet::new()),
        });

        let (tx, rx) = mpsc::channel::<QueuedJob>(config.worker.queue_capacity.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));

        let worker_count = config.worker.count.max(1);
        let workers = (0..worker_count)
            .map(|worker| {
                let inner = inner.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };
                        inner.run_job(job).await;
                    }
                    info!(worker, "Job worker stopped");
                })
            })
            .collect();

        info!(workers = worker_count, "Answer engine started");

        Self {
            inner,
            config,
            tx,
            workers,
        }
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let Self { tx, workers, .. } = self;
        drop(tx);
        for handle in workers {
            let _ = handle.await;
        }
    }

    // ========================================================================
    // Document & Question Management
    // ========================================================================

    /// Register a document for indexing.
    ///
    /// Re-uploading identical content into the same project returns the
    /// existing record instead of creating a duplicate.
    pub async fn register_document(&self, new: NewDocument) -> Result<DocumentRecord> {
        new.validate()?;

        if let Some(existing) = self
            .inner
            .store
            .document_by_hash(new.namespace, &new.content_hash)
            .await?
        {
            info!(
                document_id = %existing.id,
                namespace = %new.namespace,
                "Document with identical content already registered"
            );
            return Ok(existing);
        }

        let document = DocumentRecord {
            id: Uuid::new_v4(),
            tenant_id: new.namespace.tenant_id,
            project_id: new.namespace.project_id,
            filename: new.filename,
            content_hash: new.content_hash,
            processing_status: ProcessingStatus::Pending,
            chunk_count: 0,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.inner.store.insert_document(document.clone()).await?;
        Ok(document)
    }

    /// Create a questionnaire question.
    pub async fn create_question(&self, new: NewQuestion) -> Result<QuestionRecord> {
        new.validate()?;

        let question = QuestionRecord {
            id: Uuid::new_v4(),
            tenant_id: new.namespace.tenant_id,
            project_id: new.namespace.project_id,
            text: new.text,
            category: new.category,
            number: new.number,
            ground_truth_answer: new.ground_truth_answer,
            status: QuestionStatus::Pending,
            created_at: Utc::now(),
        };
        self.inner.store.insert_question(question.clone()).await?;
        Ok(question)
    }

    /// Documents in a project, in creation order.
    pub async fn documents(&self, namespace: Namespace) -> Result<Vec<DocumentRecord>> {
        self.inner.store.documents_for_project(namespace).await
    }

    /// Questions in a project, in creation order.
    pub async fn questions(&self, namespace: Namespace) -> Result<Vec<QuestionRecord>> {
        self.inner.store.questions_for_project(namespace).await
    }

    /// Delete a question, cascading its answer, citations and versions.
    pub async fn delete_question(&self, question_id: Uuid) -> Result<()> {
        self.inner.store.delete_question(question_id).await
    }

    /// Delete everything a project owns: questions with their answer
    /// history, documents with their chunks, and the vector partition.
    ///
    /// Citations die with their owning answers here, so the cited-document
    /// guard of [`Self::delete_document`] does not apply. Callers should
    /// cancel the project's outstanding jobs first.
    pub async fn delete_project(&self, namespace: Namespace) -> Result<()> {
        for question in self.inner.store.questions_for_project(namespace).await? {
            self.inner.store.delete_question(question.id).await?;
        }
        for document in self.inner.store.documents_for_project(namespace).await? {
            self.inner.store.delete_document(document.id).await?;
        }
        self.inner.index.drop_namespace(namespace).await?;
        info!(namespace = %namespace, "Project data deleted");
        Ok(())
    }

    /// Delete a document and its vectors.
    ///
    /// Refused while any answer cites the document's chunks; the citations
    /// stay valid and the caller must delete the citing answers first.
    pub async fn delete_document(&self, document_id: Uuid) -> Result<()> {
        let document = self
            .inner
            .store
            .document(document_id)
            .await?
            .ok_or_else(|| EngineError::not_found("document", document_id))?;

        let cited = self
            .inner
            .store
            .citation_count_for_document(document_id)
            .await?;
        if cited > 0 {
            return Err(EngineError::Conflict {
                message: format!(
                    "document {} is cited by {} citation(s) and cannot be deleted",
                    document_id, cited
                ),
            });
        }

        self.inner.store.delete_document(document_id).await?;
        self.inner
            .index
            .remove_document(document.namespace(), document_id)
            .await?;
        info!(document_id = %document_id, "Document deleted");
        Ok(())
    }

    // ========================================================================
    // Job Submission & Polling
    // ========================================================================

    /// Queue an indexing pass over the extracted pages of a registered
    /// document. Returns the job id to poll.
    pub async fn submit_indexing(
        &self,
        document_id: Uuid,
        pages: Vec<ExtractedPage>,
    ) -> Result<Uuid> {
        let document = self
            .inner
            .store
            .document(document_id)
            .await?
            .ok_or_else(|| EngineError::not_found("document", document_id))?;

        {
            let mut active = self
                .inner
                .active_indexing
                .lock()
                .map_err(|_| EngineError::Internal {
                    message: "indexing guard lock poisoned".to_string(),
                })?;
            if !active.insert(document_id) {
                return Err(EngineError::Conflict {
                    message: format!("indexing already in flight for document {}", document_id),
                });
            }
        }

        let ctx = match self.inner.registry.create(JobKind::Indexing {
            tenant_id: document.tenant_id,
            project_id: document.project_id,
            document_id,
        }) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.inner.release_indexing(document_id);
                return Err(e);
            }
        };
        let job_id = ctx.job_id();

        self.enqueue(
            QueuedJob {
                ctx,
                payload: JobPayload::Indexing { document_id, pages },
            },
            job_id,
        )
        .await
        .inspect_err(|_| self.inner.release_indexing(document_id))?;

        Ok(job_id)
    }

    /// Queue answer generation for a question.
    ///
    /// Fails with `ConcurrencyConflict` when a generation job for the same
    /// question is already queued or running.
    pub async fn submit_generation(&self, tenant_id: Uuid, question_id: Uuid) -> Result<Uuid> {
        let question = self
            .inner
            .store
            .question(question_id)
            .await?
            // A question in another tenant is indistinguishable from a
            // missing one.
            .filter(|q| q.tenant_id == tenant_id)
            .ok_or_else(|| EngineError::not_found("question", question_id))?;

        {
            let mut active = self
                .inner
                .active_generations
                .lock()
                .map_err(|_| EngineError::Internal {
                    message: "generation guard lock poisoned".to_string(),
                })?;
            if !active.insert(question_id) {
                return Err(EngineError::ConcurrencyConflict { question_id });
            }
        }

        let ctx = match self.inner.registry.create(JobKind::Generation {
            tenant_id: question.tenant_id,
            question_id,
        }) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.inner.release_generation(question_id);
                return Err(e);
            }
        };
        let job_id = ctx.job_id();

        self.enqueue(
            QueuedJob {
                ctx,
                payload: JobPayload::Generation { question_id },
            },
            job_id,
        )
        .await
        .inspect_err(|_| self.inner.release_generation(question_id))?;

        Ok(job_id)
    }

    async fn enqueue(&self, job: QueuedJob, job_id: Uuid) -> Result<()> {
        self.tx.send(job).await.map_err(|_| {
            error!(job_id = %job_id, "Job queue closed");
            EngineError::Internal {
                message: "job queue closed".to_string(),
            }
        })
    }

    /// Poll a job's state and progress.
    pub fn poll(&self, job_id: Uuid) -> Result<JobSnapshot> {
        self.inner.registry.poll(job_id)
    }

    /// Cancel a queued or in-flight job. Cancellation is honored at the
    /// next provider-call suspension point.
    pub fn cancel(&self, job_id: Uuid) -> Result<()> {
        self.inner.registry.cancel(job_id)
    }

    // ========================================================================
    // Review & Evaluation
    // ========================================================================

    /// Apply a reviewer action to a question's current answer.
    ///
    /// Persists the transitioned answer, exactly one version snapshot and
    /// the implied question status.
    pub async fn review(&self, question_id: Uuid, action: ReviewAction) -> Result<ReviewOutcome> {
        let question = self
            .inner
            .store
            .question(question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("question", question_id))?;

        let current = self
            .inner
            .store
            .answer_for_question(question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("answer", question_id))?;

        let outcome = ReviewStateMachine::apply(&current, action)?;

        // Version first: its dense-sequence check guards the whole
        // transition against a concurrent reviewer.
        self.inner
            .store
            .append_version(outcome.version.clone())
            .await?;
        self.inner.store.upsert_answer(outcome.answer.clone()).await?;
        self.inner
            .store
            .update_question_status(question.id, outcome.question_status)
            .await?;

        info!(
            question_id = %question_id,
            answer_id = %outcome.answer.id,
            change = outcome.version.change_type.as_str(),
            version = outcome.answer.version,
            "Review action applied"
        );

        Ok(outcome)
    }

    /// Version history for a question's current answer.
    pub async fn answer_history(
        &self,
        question_id: Uuid,
    ) -> Result<Vec<ddq_common::models::AnswerVersionRecord>> {
        let answer = self
            .inner
            .store
            .answer_for_question(question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("answer", question_id))?;
        self.inner.store.versions_for_answer(answer.id).await
    }

    /// Evaluate a question's current answer against its ground truth.
    ///
    /// Without a ground-truth reference this returns the all-null report
    /// and never touches a provider.
    pub async fn evaluate(&self, question_id: Uuid) -> Result<EvaluationReport> {
        let question = self
            .inner
            .store
            .question(question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("question", question_id))?;

        let Some(ground_truth) = question
            .ground_truth_answer
            .as_deref()
            .filter(|gt| !gt.trim().is_empty())
        else {
            return Ok(EvaluationReport::without_ground_truth());
        };

        let answer = self
            .inner
            .store
            .answer_for_question(question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("answer", question_id))?;

        let api_key = self
            .inner
            .credentials
            .credential(question.tenant_id)
            .await?
            .ok_or(EngineError::CredentialMissing {
                tenant_id: question.tenant_id,
            })?;
        let embedder = self.inner.providers.embedder(&api_key)?;

        Ok(EvaluationEngine::evaluate(&answer.text, ground_truth, embedder.as_ref()).await)
    }

    /// Engine configuration in effect.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddq_common::credentials::{MockProviderFactory, StaticCredentials};
    use ddq_common::index::MemoryVectorIndex;
    use ddq_common::models::Namespace;
    use ddq_common::store::MemoryStore;
    use std::time::Duration;

    use crate::jobs::JobState;

    struct Fixture {
        engine: AnswerEngine,
        store: Arc<MemoryStore>,
        namespace: Namespace,
    }

    fn fixture_with(providers: MockProviderFactory) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryVectorIndex::new());
        let credentials = Arc::new(StaticCredentials::new());
        let namespace = Namespace::new(Uuid::new_v4(), Uuid::new_v4());
        credentials.set(namespace.tenant_id, "sk-test");

        let engine = AnswerEngine::new(
            store.clone(),
            index,
            credentials,
            Arc::new(providers),
            AppConfig::default(),
        );

        Fixture {
            engine,
            store,
            namespace,
        }
    }

    async fn wait_terminal(engine: &AnswerEngine, job_id: Uuid) -> JobSnapshot {
        for _ in 0..500 {
            let snapshot = engine.poll(job_id).unwrap();
            if snapshot.state.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    fn new_document(namespace: Namespace, content: &str) -> NewDocument {
        NewDocument {
            namespace,
            filename: "report.pdf".to_string(),
            content_hash: ddq_common::models::short_hash(content),
        }
    }

    #[tokio::test]
    async fn test_indexing_job_runs_to_completion() {
        let f = fixture_with(MockProviderFactory::with_answer(32, "unused"));

        let content = "Total revenue was fifty million dollars in fiscal 2024.";
        let document = f
            .engine
            .register_document(new_document(f.namespace, content))
            .await
            .unwrap();

        let job_id = f
            .engine
            .submit_indexing(
                document.id,
                vec![ExtractedPage {
                    page_number: 1,
                    text: content.to_string(),
                }],
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&f.engine, job_id).await;
        assert_eq!(snapshot.state, JobState::Succeeded);

        let stored = f.store.document(document.id).await.unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Completed);
        assert!(stored.chunk_count >= 1);
    }

    #[tokio::test]
    async fn test_identical_content_reuses_document() {
        let f = fixture_with(MockProviderFactory::with_answer(32, "unused"));

        let first = f
            .engine
            .register_document(new_document(f.namespace, "same bytes"))
            .await
            .unwrap();
        let second = f
            .engine
            .register_document(new_document(f.namespace, "same bytes"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_generation_for_unknown_question_is_not_found() {
        let f = fixture_with(MockProviderFactory::with_answer(32, "x"));
        let err = f
            .engine
            .submit_generation(f.namespace.tenant_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cross_tenant_question_reads_as_missing() {
        let f = fixture_with(MockProviderFactory::with_answer(32, "x"));
        let question = f
            .engine
            .create_question(NewQuestion {
                namespace: f.namespace,
                text: "What is total revenue?".to_string(),
                category: None,
                number: None,
                ground_truth_answer: None,
            })
            .await
            .unwrap();

        let err = f
            .engine
            .submit_generation(Uuid::new_v4(), question.id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_evaluate_without_ground_truth_short_circuits() {
        let f = fixture_with(MockProviderFactory::with_answer(32, "x"));
        let question = f
            .engine
            .create_question(NewQuestion {
                namespace: f.namespace,
                text: "What is total revenue?".to_string(),
                category: None,
                number: None,
                ground_truth_answer: None,
            })
            .await
            .unwrap();

        // No answer exists either; the short circuit wins before that check
        let report = f.engine.evaluate(question.id).await.unwrap();
        assert!(!report.has_ground_truth);
        assert!(report.overall.is_none());
    }

    #[tokio::test]
    async fn test_blank_question_text_rejected() {
        let f = fixture_with(MockProviderFactory::with_answer(32, "x"));
        let err = f
            .engine
            .create_question(NewQuestion {
                namespace: f.namespace,
                text: String::new(),
                category: None,
                number: None,
                ground_truth_answer: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_drains_workers() {
        let f = fixture_with(MockProviderFactory::with_answer(32, "unused"));
        f.engine.shutdown().await;
    }
}
