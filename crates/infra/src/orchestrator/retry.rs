//! Retry Controller.

use chrono::Utc;
use tracing::{info, instrument};

use datastory_core::{JobId, UserId};
use datastory_jobs::{Job, JobTransition};

use super::{Orchestrator, OrchestratorError};

impl Orchestrator {
    /// Start a new attempt of a failed job and dispatch it with the original
    /// source and options.
    ///
    /// Preconditions, checked in order without mutating anything: the caller
    /// owns the job, the job is `failed`, attempts remain, and a quota slot
    /// can be reserved again. The row count accepted at admission stands
    /// even if the owner's tier has since changed.
    #[instrument(skip(self), fields(job_id = %job_id, user_id = %caller))]
    pub async fn retry(&self, job_id: JobId, caller: UserId) -> Result<Job, OrchestratorError> {
        let _guard = self.locks.acquire(job_id).await;
        let now = Utc::now();
        let policy = self.settings.retry;

        let job = self.owned_job(job_id, caller).await?;
        job.clone().apply(JobTransition::Retry { policy }, now)?;

        self.ledger.reserve_slot(job.owner_id, job_id, now).await?;

        let retried = match self
            .jobs
            .transition(job_id, JobTransition::Retry { policy }, now)
            .await
        {
            Ok(t) => t,
            Err(err) => {
                self.release_reservation(job.owner_id, job_id).await;
                return Err(err.into());
            }
        };

        info!(job_id = %job_id, attempt = retried.job.attempts, "job retried");
        self.dispatch(retried.job).await
    }
}
