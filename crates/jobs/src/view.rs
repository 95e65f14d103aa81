use chrono::{DateTime, Utc};
use serde::Serialize;

use datastory_core::{JobId, StoryId};

use crate::job::{Job, JobError, JobStatus, Stage};
use crate::retry::RetryPolicy;

/// Read-only projection of a job for polling clients.
///
/// Only the fields listed here leave the core; options, source handles and
/// attempt history stay internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stage: Stage,
    pub progress: u8,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<StoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub can_retry: bool,
}

impl JobStatusView {
    pub fn project(job: &Job, policy: &RetryPolicy) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            attempts: job.attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
            result_ref: job.result_ref,
            error: job.error.clone(),
            can_retry: policy.can_retry(job.status, job.attempts),
        }
    }
}
