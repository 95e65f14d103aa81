//! Job storage and the single per-job write path.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use datastory_core::{JobId, StoryId};
use datastory_jobs::{Job, JobStatus, JobTransition, Stage, TransitionError, TransitionOutcome};

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("storage error: {0}")]
    Storage(String),
}

/// A transition result together with the job as stored afterwards.
#[derive(Debug, Clone)]
pub struct Transitioned {
    pub outcome: TransitionOutcome,
    pub job: Job,
}

/// Job store abstraction.
///
/// All mutations after `create` go through [`JobStore::transition`], which
/// reads the current record, runs [`Job::apply`] and persists the result as
/// one atomic step per job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly admitted job.
    async fn create(&self, job: Job) -> Result<Job, JobStoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Apply `transition` to the stored job.
    ///
    /// Nothing is written unless the outcome is `Applied`.
    async fn transition(
        &self,
        job_id: JobId,
        transition: JobTransition,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, JobStoreError>;

    /// Jobs still `processing` whose last update is older than `cutoff`,
    /// oldest first.
    async fn list_stale(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<JobId>, JobStoreError>;

    async fn apply_progress(
        &self,
        job_id: JobId,
        stage: Option<Stage>,
        progress: Option<u8>,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, JobStoreError> {
        self.transition(
            job_id,
            JobTransition::Progress {
                stage,
                progress,
                attempt,
            },
            now,
        )
        .await
    }

    async fn apply_failure(
        &self,
        job_id: JobId,
        code: String,
        message: String,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, JobStoreError> {
        self.transition(
            job_id,
            JobTransition::Fail {
                code,
                message,
                attempt,
            },
            now,
        )
        .await
    }

    async fn apply_completion(
        &self,
        job_id: JobId,
        result_ref: StoryId,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, JobStoreError> {
        self.transition(
            job_id,
            JobTransition::Complete {
                story_id: result_ref,
                attempt,
            },
            now,
        )
        .await
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job map lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&job_id).cloned())
    }

    async fn transition(
        &self,
        job_id: JobId,
        transition: JobTransition,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        let outcome = job.apply(transition, now)?;
        Ok(Transitioned {
            outcome,
            job: job.clone(),
        })
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<JobId>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut stale: Vec<_> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing && j.updated_at < cutoff)
            .map(|j| (j.updated_at, j.id))
            .collect();
        stale.sort();
        Ok(stale.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use datastory_core::UserId;
    use datastory_jobs::{DatasetFormat, DiscardReason, SourceHandle};

    fn job() -> Job {
        let source = SourceHandle {
            storage_key: "uploads/u/j/sales.csv".to_string(),
            file_name: "sales.csv".to_string(),
            format: DatasetFormat::Csv,
            size_bytes: 64,
            row_count: 10,
            column_count: 3,
        };
        Job::new(UserId::new(), source, serde_json::json!({}), Utc::now())
    }

    #[tokio::test]
    async fn create_get_and_duplicate_create() {
        let store = InMemoryJobStore::new();
        let job = store.create(job()).await.unwrap();

        assert_eq!(store.get(job.id).await.unwrap(), Some(job.clone()));
        assert!(matches!(
            store.create(job.clone()).await,
            Err(JobStoreError::AlreadyExists(id)) if id == job.id
        ));
        assert_eq!(store.get(JobId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_job_transition_creates_nothing() {
        let store = InMemoryJobStore::new();
        let missing = JobId::new();
        let res = store
            .apply_progress(missing, Some(Stage::Analyzing), Some(40), None, Utc::now())
            .await;
        assert!(matches!(res, Err(JobStoreError::NotFound(id)) if id == missing));
        assert_eq!(store.get(missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_transition_leaves_record_untouched() {
        let store = InMemoryJobStore::new();
        let job = store.create(job()).await.unwrap();
        let now = Utc::now();

        store
            .apply_failure(job.id, "PARSE_ERROR".into(), "bad".into(), None, now)
            .await
            .unwrap();
        let before = store.get(job.id).await.unwrap();

        let res = store.apply_completion(job.id, StoryId::new(), None, now).await;
        assert!(matches!(res, Err(JobStoreError::Transition(TransitionError::Inconsistent { .. }))));
        assert_eq!(store.get(job.id).await.unwrap(), before);

        let late = store
            .apply_progress(job.id, Some(Stage::Analyzing), Some(90), None, now)
            .await
            .unwrap();
        assert_eq!(late.outcome, TransitionOutcome::Discarded(DiscardReason::TerminalState));
    }

    #[tokio::test]
    async fn list_stale_returns_idle_processing_jobs_oldest_first() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let mut old = job();
        old.updated_at = now - Duration::hours(2);
        let mut older = job();
        older.updated_at = now - Duration::hours(3);
        let fresh = job();
        let mut done = job();
        done.updated_at = now - Duration::hours(5);
        done.status = JobStatus::Completed;

        for j in [&old, &older, &fresh, &done] {
            store.create(j.clone()).await.unwrap();
        }

        let stale = store.list_stale(now - Duration::hours(1), 10).await.unwrap();
        assert_eq!(stale, vec![older.id, old.id]);
        assert_eq!(store.list_stale(now - Duration::hours(1), 1).await.unwrap(), vec![older.id]);
    }
}
