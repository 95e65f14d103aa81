//! Finalizer: completion signal → story, completed job, counted story.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use datastory_core::{JobId, StoryId};
use datastory_jobs::{CompletionPayload, Job, JobTransition, Story, TransitionOutcome};

use super::{Orchestrator, OrchestratorError};

impl Orchestrator {
    /// Finalize a completed job. The caller holds the job's lock.
    ///
    /// A job that is already `completed` yields `Duplicate` without a second
    /// story. The quota count is re-asserted in that case; it is keyed by job
    /// so it lands at most once.
    pub(crate) async fn finalize(
        &self,
        job_id: JobId,
        payload: CompletionPayload,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound(job_id))?;

        // Dry run against the current record so a rejected or discarded
        // signal never writes a story.
        let probe = job.clone().apply(
            JobTransition::Complete {
                story_id: StoryId::new(),
                attempt,
            },
            now,
        )?;
        match probe {
            TransitionOutcome::Applied => {}
            TransitionOutcome::Duplicate => {
                self.count_story(&job, now).await?;
                return Ok(TransitionOutcome::Duplicate);
            }
            TransitionOutcome::Discarded(_) => return Ok(probe),
        }

        let (story, created) = self
            .stories
            .insert_for_job(Story::from_completion(&job, payload, now))
            .await?;

        let completed = match self.jobs.apply_completion(job_id, story.id, attempt, now).await {
            Ok(t) => t,
            Err(err) => {
                if created {
                    self.discard_story(story.id).await;
                }
                return Err(err.into());
            }
        };
        if !completed.outcome.is_applied() {
            if created {
                self.discard_story(story.id).await;
            }
            return Ok(completed.outcome);
        }

        self.count_story(&completed.job, now).await?;
        info!(job_id = %job_id, story_id = %story.id, attempt = completed.job.attempts, "job completed");
        Ok(TransitionOutcome::Applied)
    }

    async fn count_story(&self, job: &Job, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let counted = self.ledger.record_completion(job.owner_id, job.id, now).await?;
        if counted {
            debug!(job_id = %job.id, user_id = %job.owner_id, "story counted against quota");
        }
        Ok(())
    }

    async fn discard_story(&self, story_id: StoryId) {
        if let Err(err) = self.stories.remove(story_id).await {
            error!(story_id = %story_id, error = %err, "failed to remove orphaned story");
        }
    }
}
