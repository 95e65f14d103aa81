//! The job state machine.
//!
//! ```text
//!              progress (same attempt, non-decreasing)
//!                 ┌──────┐
//!                 ▼      │
//!   create ──► processing ──complete──► completed
//!                 │  ▲
//!     fail/timeout│  │retry (attempts < max)
//!                 ▼  │
//!                failed
//! ```
//!
//! Signals that arrive for a terminal job are either duplicates of the
//! recorded outcome (no-op) or inconsistencies (error, state untouched).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use datastory_core::StoryId;

use crate::code::ErrorCode;
use crate::job::{AttemptOutcome, Job, JobError, JobStatus, Stage};
use crate::retry::RetryPolicy;

/// Every mutation a job can undergo after creation.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// Worker progress report.
    Progress {
        stage: Option<Stage>,
        progress: Option<u8>,
        attempt: Option<u32>,
    },
    /// Worker-reported or dispatch failure.
    Fail {
        code: String,
        message: String,
        attempt: Option<u32>,
    },
    /// Finalization: link the created story.
    Complete {
        story_id: StoryId,
        attempt: Option<u32>,
    },
    /// Caller-initiated new attempt on the same job id.
    Retry { policy: RetryPolicy },
    /// Fail a job that has sat in `processing` since before `cutoff`.
    TimeOut { cutoff: DateTime<Utc> },
}

impl JobTransition {
    pub fn name(&self) -> &'static str {
        match self {
            JobTransition::Progress { .. } => "progress",
            JobTransition::Fail { .. } => "fail",
            JobTransition::Complete { .. } => "complete",
            JobTransition::Retry { .. } => "retry",
            JobTransition::TimeOut { .. } => "timeout",
        }
    }
}

/// Why a signal was accepted but not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Progress for a job that already reached a terminal state.
    TerminalState,
    /// The signal belongs to an earlier attempt.
    StaleAttempt,
    /// Timeout sweep found the job active again.
    NotStale,
}

/// Result of applying a transition that did not violate the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// State changed; persist and run side effects.
    Applied,
    /// The job already holds this outcome; persist nothing, run no side effects.
    Duplicate,
    /// Signal ignored; state unchanged.
    Discarded(DiscardReason),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {attempted} a job that is already {current}")]
    Inconsistent {
        current: JobStatus,
        attempted: &'static str,
    },

    #[error("job has used {attempts} of {max_attempts} attempts")]
    MaxRetriesExceeded { attempts: u32, max_attempts: u32 },

    #[error("job is {status}; only failed jobs can be retried")]
    NotRetryable { status: JobStatus },

    #[error("progress must be between 0 and 100, got {0}")]
    InvalidProgress(u8),
}

impl TransitionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransitionError::Inconsistent { .. } => ErrorCode::InconsistentState,
            TransitionError::MaxRetriesExceeded { .. } => ErrorCode::MaxRetriesExceeded,
            TransitionError::NotRetryable { .. } => ErrorCode::JobNotRetryable,
            TransitionError::InvalidProgress(_) => ErrorCode::InvalidCallback,
        }
    }
}

impl Job {
    /// Apply a transition, checking the current status first.
    ///
    /// On `Err`, or any outcome other than `Applied`, the job is unchanged.
    pub fn apply(
        &mut self,
        transition: JobTransition,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        match transition {
            JobTransition::Progress {
                stage,
                progress,
                attempt,
            } => self.apply_progress(stage, progress, attempt, now),
            JobTransition::Fail {
                code,
                message,
                attempt,
            } => self.apply_failure(JobError::new(code, message, now), attempt, now),
            JobTransition::Complete { story_id, attempt } => {
                self.apply_completion(story_id, attempt, now)
            }
            JobTransition::Retry { policy } => self.apply_retry(policy, now),
            JobTransition::TimeOut { cutoff } => {
                if self.status != JobStatus::Processing || self.updated_at >= cutoff {
                    return Ok(TransitionOutcome::Discarded(DiscardReason::NotStale));
                }
                let error = JobError::new(
                    ErrorCode::JobTimeout.as_str(),
                    format!(
                        "no worker callback received since {}",
                        self.updated_at.to_rfc3339()
                    ),
                    now,
                );
                self.apply_failure(error, None, now)
            }
        }
    }

    fn is_stale(&self, attempt: Option<u32>) -> bool {
        attempt.is_some_and(|a| a != self.attempts)
    }

    fn apply_progress(
        &mut self,
        stage: Option<Stage>,
        progress: Option<u8>,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if let Some(p) = progress {
            if p > 100 {
                return Err(TransitionError::InvalidProgress(p));
            }
        }
        if self.status.is_terminal() {
            return Ok(TransitionOutcome::Discarded(DiscardReason::TerminalState));
        }
        if self.is_stale(attempt) {
            return Ok(TransitionOutcome::Discarded(DiscardReason::StaleAttempt));
        }

        if let Some(stage) = stage {
            self.stage = stage;
        }
        if let Some(p) = progress {
            self.progress = self.progress.max(p);
        }
        self.updated_at = now;
        Ok(TransitionOutcome::Applied)
    }

    fn apply_failure(
        &mut self,
        error: JobError,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if self.is_stale(attempt) {
            return Ok(TransitionOutcome::Discarded(DiscardReason::StaleAttempt));
        }
        match self.status {
            JobStatus::Processing => {
                self.close_attempt(AttemptOutcome::Failed, Some(error.clone()), now);
                self.status = JobStatus::Failed;
                self.error = Some(error);
                self.updated_at = now;
                Ok(TransitionOutcome::Applied)
            }
            JobStatus::Failed => Ok(TransitionOutcome::Duplicate),
            JobStatus::Completed => Err(TransitionError::Inconsistent {
                current: JobStatus::Completed,
                attempted: "fail",
            }),
        }
    }

    fn apply_completion(
        &mut self,
        story_id: StoryId,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if self.is_stale(attempt) {
            return Ok(TransitionOutcome::Discarded(DiscardReason::StaleAttempt));
        }
        match self.status {
            JobStatus::Processing => {
                self.close_attempt(AttemptOutcome::Completed, None, now);
                self.status = JobStatus::Completed;
                self.result_ref = Some(story_id);
                self.progress = 100;
                self.error = None;
                self.updated_at = now;
                Ok(TransitionOutcome::Applied)
            }
            JobStatus::Completed => Ok(TransitionOutcome::Duplicate),
            JobStatus::Failed => Err(TransitionError::Inconsistent {
                current: JobStatus::Failed,
                attempted: "complete",
            }),
        }
    }

    fn apply_retry(
        &mut self,
        policy: RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if self.status != JobStatus::Failed {
            return Err(TransitionError::NotRetryable {
                status: self.status,
            });
        }
        if !policy.should_retry(self.attempts) {
            return Err(TransitionError::MaxRetriesExceeded {
                attempts: self.attempts,
                max_attempts: policy.max_attempts,
            });
        }

        self.attempts += 1;
        self.status = JobStatus::Processing;
        self.error = None;
        self.progress = 0;
        self.stage = Stage::default();
        self.attempt_started_at = now;
        self.updated_at = now;
        Ok(TransitionOutcome::Applied)
    }
}
