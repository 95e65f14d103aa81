//! Status Reporter and other read-only views.

use chrono::Utc;

use datastory_core::{JobId, StoryId, UserId};
use datastory_jobs::{Job, JobStatusView, Story};
use datastory_quota::{QuotaSnapshot, Tier};

use super::{Orchestrator, OrchestratorError};

impl Orchestrator {
    /// Load a job, refusing callers other than its owner.
    pub(crate) async fn owned_job(&self, job_id: JobId, caller: UserId) -> Result<Job, OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound(job_id))?;
        if !job.is_owned_by(caller) {
            return Err(OrchestratorError::Forbidden);
        }
        Ok(job)
    }

    pub async fn status(&self, job_id: JobId, caller: UserId) -> Result<JobStatusView, OrchestratorError> {
        let job = self.owned_job(job_id, caller).await?;
        Ok(JobStatusView::project(&job, &self.settings.retry))
    }

    pub async fn story(&self, story_id: StoryId, caller: UserId) -> Result<Story, OrchestratorError> {
        let story = self
            .stories
            .get(story_id)
            .await?
            .ok_or(OrchestratorError::StoryNotFound(story_id))?;
        if story.owner_id != caller {
            return Err(OrchestratorError::Forbidden);
        }
        Ok(story)
    }

    pub async fn quota(&self, caller: UserId) -> Result<QuotaSnapshot, OrchestratorError> {
        Ok(self.ledger.snapshot(caller, Utc::now()).await?)
    }

    /// Provision or sync the caller's owner record from their token.
    pub async fn ensure_account(&self, user_id: UserId, tier: Tier) -> Result<QuotaSnapshot, OrchestratorError> {
        Ok(self.ledger.ensure_account(user_id, tier, Utc::now()).await?)
    }
}
