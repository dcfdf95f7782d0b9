//! Background job bookkeeping
//!
//! Indexing and generation run as independently cancelable background units.
//! Polling the registry is the only externally visible progress mechanism:
//! progress is monotonic and terminal states are sticky.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use ddq_common::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a job does, with its dedup key material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobKind {
    Indexing {
        tenant_id: Uuid,
        project_id: Uuid,
        document_id: Uuid,
    },
    Generation {
        tenant_id: Uuid,
        question_id: Uuid,
    },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Indexing { .. } => "indexing",
            JobKind::Generation { .. } => "generation",
        }
    }
}

/// Externally visible job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Monotonic progress within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub stage: String,
    pub completed: u32,
    pub total: u32,
}

impl JobProgress {
    fn queued() -> Self {
        Self {
            stage: "queued".to_string(),
            completed: 0,
            total: 0,
        }
    }
}

/// Snapshot returned from `poll`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: JobProgress,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobRecord {
    snapshot: JobSnapshot,
    cancel: Arc<AtomicBool>,
}

/// In-process registry of all submitted jobs
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn lock_poisoned() -> EngineError {
        EngineError::Storage {
            message: "job registry lock poisoned".to_string(),
        }
    }

    /// Register a freshly submitted job and hand back its context
    pub fn create(&self, kind: JobKind) -> Result<JobContext> {
        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let record = JobRecord {
            snapshot: JobSnapshot {
                id,
                kind,
                state: JobState::Queued,
                progress: JobProgress::queued(),
                error: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
            },
            cancel: cancel.clone(),
        };

        let mut jobs = self.jobs.write().map_err(|_| Self::lock_poisoned())?;
        jobs.insert(id, record);

        Ok(JobContext {
            job_id: id,
            registry: self.clone(),
            cancel,
        })
    }

    /// Poll a job by id
    pub fn poll(&self, job_id: Uuid) -> Result<JobSnapshot> {
        let jobs = self.jobs.read().map_err(|_| Self::lock_poisoned())?;
        jobs.get(&job_id)
            .map(|record| record.snapshot.clone())
            .ok_or_else(|| EngineError::JobNotFound {
                id: job_id.to_string(),
            })
    }

    /// Request cancellation. Terminal jobs are left untouched.
    pub fn cancel(&self, job_id: Uuid) -> Result<()> {
        let jobs = self.jobs.read().map_err(|_| Self::lock_poisoned())?;
        let record = jobs.get(&job_id).ok_or_else(|| EngineError::JobNotFound {
            id: job_id.to_string(),
        })?;
        if !record.snapshot.state.is_terminal() {
            record.cancel.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn update<F>(&self, job_id: Uuid, mutate: F)
    where
        F: FnOnce(&mut JobSnapshot),
    {
        if let Ok(mut jobs) = self.jobs.write() {
            if let Some(record) = jobs.get_mut(&job_id) {
                // Terminal states are sticky
                if !record.snapshot.state.is_terminal() {
                    mutate(&mut record.snapshot);
                }
            }
        }
    }

    pub(crate) fn mark_running(&self, job_id: Uuid) {
        self.update(job_id, |snapshot| {
            snapshot.state = JobState::Running;
            snapshot.started_at = Some(Utc::now());
            snapshot.progress.stage = "running".to_string();
        });
    }

    pub(crate) fn mark_succeeded(&self, job_id: Uuid) {
        self.update(job_id, |snapshot| {
            snapshot.state = JobState::Succeeded;
            snapshot.finished_at = Some(Utc::now());
            snapshot.progress.stage = "done".to_string();
            snapshot.progress.completed = snapshot.progress.completed.max(snapshot.progress.total);
        });
    }

    pub(crate) fn mark_failed(&self, job_id: Uuid, error: &EngineError) {
        self.update(job_id, |snapshot| {
            snapshot.state = JobState::Failed;
            snapshot.finished_at = Some(Utc::now());
            snapshot.error = Some(error.to_string());
        });
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle given to processors for progress reporting and cancellation checks
#[derive(Clone)]
pub struct JobContext {
    job_id: Uuid,
    registry: JobRegistry,
    cancel: Arc<AtomicBool>,
}

impl JobContext {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Bail out with a typed error when the caller has canceled this job
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Canceled { job_id: self.job_id })
        } else {
            Ok(())
        }
    }

    /// Advance progress. Completed counts never move backwards.
    pub fn set_progress(&self, stage: &str, completed: u32, total: u32) {
        self.registry.update(self.job_id, |snapshot| {
            snapshot.progress.stage = stage.to_string();
            snapshot.progress.total = snapshot.progress.total.max(total);
            snapshot.progress.completed = snapshot.progress.completed.max(completed);
        });
    }
}
