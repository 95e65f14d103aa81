//! Callback Handler.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use datastory_core::JobId;
use datastory_jobs::{CompletionPayload, Stage, TransitionError, TransitionOutcome};

use super::{Orchestrator, OrchestratorError};

/// A worker-originated signal for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerSignal {
    Progress {
        stage: Option<Stage>,
        progress: Option<u8>,
        attempt: Option<u32>,
    },
    Failed {
        code: String,
        message: String,
        attempt: Option<u32>,
    },
    Completed {
        payload: CompletionPayload,
        attempt: Option<u32>,
    },
}

impl WorkerSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerSignal::Progress { .. } => "progress",
            WorkerSignal::Failed { .. } => "failed",
            WorkerSignal::Completed { .. } => "completed",
        }
    }
}

impl Orchestrator {
    /// Apply a worker callback to its job.
    ///
    /// Unknown jobs are rejected without creating anything. Progress for a
    /// terminal job and signals from an earlier attempt are discarded; a
    /// repeated terminal signal is a no-op. A terminal signal contradicting
    /// the recorded outcome is rejected and leaves the job untouched.
    #[instrument(skip(self, signal), fields(job_id = %job_id, signal = signal.kind()))]
    pub async fn handle_callback(
        &self,
        job_id: JobId,
        signal: WorkerSignal,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let _guard = self.locks.acquire(job_id).await;
        let now = Utc::now();
        let kind = signal.kind();

        let result = match signal {
            WorkerSignal::Progress {
                stage,
                progress,
                attempt,
            } => self
                .jobs
                .apply_progress(job_id, stage, progress, attempt, now)
                .await
                .map(|t| t.outcome)
                .map_err(OrchestratorError::from),
            WorkerSignal::Failed {
                code,
                message,
                attempt,
            } => self.record_failure(job_id, code, message, attempt, now).await,
            WorkerSignal::Completed { payload, attempt } => {
                self.finalize(job_id, payload, attempt, now).await
            }
        };

        match &result {
            Ok(TransitionOutcome::Applied) => debug!(job_id = %job_id, signal = kind, "callback applied"),
            Ok(TransitionOutcome::Duplicate) => {
                info!(job_id = %job_id, signal = kind, "duplicate terminal signal ignored")
            }
            Ok(TransitionOutcome::Discarded(reason)) => {
                debug!(job_id = %job_id, signal = kind, reason = ?reason, "callback discarded")
            }
            Err(OrchestratorError::Transition(err @ TransitionError::Inconsistent { .. })) => {
                error!(job_id = %job_id, signal = kind, error = %err, "callback contradicts recorded outcome")
            }
            Err(err) => debug!(job_id = %job_id, signal = kind, error = %err, "callback rejected"),
        }
        result
    }

    async fn record_failure(
        &self,
        job_id: JobId,
        code: String,
        message: String,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let failed = self
            .jobs
            .apply_failure(job_id, code.clone(), message, attempt, now)
            .await?;

        if failed.outcome.is_applied() {
            self.release_reservation(failed.job.owner_id, job_id).await;
            warn!(
                job_id = %job_id,
                code = %code,
                attempt = failed.job.attempts,
                can_retry = self.settings.retry.should_retry(failed.job.attempts),
                "job failed"
            );
        }
        Ok(failed.outcome)
    }
}
