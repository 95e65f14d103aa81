use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Attempt ceiling for failed jobs.
///
/// Retries are caller-initiated, so there is no backoff schedule here; the
/// policy only bounds how many dispatch attempts a job may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of dispatch attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Check if another attempt is allowed after `attempts` attempts.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// `status == failed && attempts < max_attempts`.
    pub fn can_retry(&self, status: JobStatus, attempts: u32) -> bool {
        status == JobStatus::Failed && self.should_retry(attempts)
    }
}
