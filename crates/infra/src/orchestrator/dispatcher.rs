//! Dispatcher.

use chrono::Utc;
use tracing::{info, warn};

use datastory_jobs::{ErrorCode, Job};

use super::{Orchestrator, OrchestratorError};
use crate::worker::AnalysisRequest;

impl Orchestrator {
    /// Hand `job` to the worker for its current attempt.
    ///
    /// The caller holds the job's lock. If the worker does not acknowledge,
    /// the job is failed with `DISPATCH_FAILED` (retryable) and its
    /// reservation released; the returned job reflects that.
    pub(crate) async fn dispatch(&self, job: Job) -> Result<Job, OrchestratorError> {
        let request = AnalysisRequest::for_job(&job, self.callback_url(job.id));

        let err = match self.worker.submit(&request).await {
            Ok(()) => {
                info!(job_id = %job.id, attempt = job.attempts, "job dispatched");
                return Ok(job);
            }
            Err(err) => err,
        };

        warn!(job_id = %job.id, attempt = job.attempts, error = %err, "dispatch failed");
        let failed = self
            .jobs
            .apply_failure(
                job.id,
                ErrorCode::DispatchFailed.as_str().to_string(),
                err.to_string(),
                Some(job.attempts),
                Utc::now(),
            )
            .await?;
        if failed.outcome.is_applied() {
            self.release_reservation(job.owner_id, job.id).await;
        }
        Ok(failed.job)
    }
}
