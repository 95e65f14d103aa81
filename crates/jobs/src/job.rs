//! The job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use datastory_core::{JobId, StoryId, UserId};

use crate::source::SourceHandle;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Dispatched (or about to be); the worker is expected to call back
    Processing,
    /// Story created and usage counted
    Completed,
    /// Failed; may be retried while attempts remain
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory progress label. Never used for business decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Uploading,
    Analyzing,
    GeneratingNarrative,
    CreatingVisualizations,
}

/// Failure details recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Completed,
    Failed,
}

/// Record of one finished dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub error: Option<JobError>,
}

/// One unit of dataset-to-story processing.
///
/// Mutated only through [`Job::apply`](crate::transition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub owner_id: UserId,
    pub status: JobStatus,
    pub stage: Stage,
    /// 0-100, non-decreasing within an attempt
    pub progress: u8,
    pub source: SourceHandle,
    /// User-chosen processing parameters, passed to the worker unchanged
    pub options: serde_json::Value,
    pub error: Option<JobError>,
    /// Dispatch attempts so far, starting at 1
    pub attempts: u32,
    pub result_ref: Option<StoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempt_started_at: DateTime<Utc>,
    pub history: Vec<AttemptRecord>,
}

impl Job {
    /// Create a new job in `processing`, first attempt, no progress.
    pub fn new(
        owner_id: UserId,
        source: SourceHandle,
        options: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_id(JobId::new(), owner_id, source, options, now)
    }

    pub fn with_id(
        id: JobId,
        owner_id: UserId,
        source: SourceHandle,
        options: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            status: JobStatus::Processing,
            stage: Stage::default(),
            progress: 0,
            source,
            options,
            error: None,
            attempts: 1,
            result_ref: None,
            created_at: now,
            updated_at: now,
            attempt_started_at: now,
            history: Vec::new(),
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    pub(crate) fn close_attempt(
        &mut self,
        outcome: AttemptOutcome,
        error: Option<JobError>,
        now: DateTime<Utc>,
    ) {
        self.history.push(AttemptRecord {
            attempt: self.attempts,
            started_at: self.attempt_started_at,
            finished_at: now,
            outcome,
            error,
        });
    }
}
