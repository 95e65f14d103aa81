//! The job-orchestration core.
//!
//! ## Design
//!
//! - Admission gates job creation on file type, size, row count and quota,
//!   in that order, and reserves a story slot atomically with the quota check
//! - Every write to a job happens under that job's lock ([`JobLocks`]) and
//!   through the store's single transition path
//! - The finalizer is the idempotency boundary: one story per job, one
//!   counted story per job, no matter how often completion is delivered
//! - Failures release the job's reservation; a retry re-reserves before the
//!   job re-enters `processing`
//!
//! ## Components
//!
//! - `admission`: `Orchestrator::submit`
//! - `dispatcher`: hands jobs to the worker, fails them on dispatch errors
//! - `callbacks`: `Orchestrator::handle_callback`
//! - `finalizer`: completion → story + completed job + quota count
//! - `retry`: `Orchestrator::retry`
//! - `status`: read-only projections
//! - `reaper`: times out jobs that never hear back from the worker

mod admission;
mod callbacks;
mod dispatcher;
mod error;
mod finalizer;
mod locks;
mod reaper;
mod retry;
mod status;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use datastory_core::{JobId, UserId};
use datastory_jobs::RetryPolicy;

use crate::config::AppConfig;
use crate::storage::ObjectStorage;
use crate::store::{JobStore, QuotaLedger, StoryStore};
use crate::worker::WorkerClient;

pub use admission::{Upload, accepted_format};
pub use callbacks::WorkerSignal;
pub use error::OrchestratorError;
pub use locks::JobLocks;
pub use reaper::{ReaperHandle, StaleJobReaper};

/// Tunables of the orchestration core.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Absolute upload ceiling, independent of tier.
    pub max_upload_bytes: u64,
    pub retry: RetryPolicy,
    /// Base URL the worker calls back on.
    pub public_base_url: String,
    /// Processing jobs idle for longer than this are timed out.
    pub stale_after: Duration,
    /// Maximum jobs timed out per sweep.
    pub sweep_batch: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            retry: RetryPolicy::default(),
            public_base_url: "http://127.0.0.1:8080".to_string(),
            stale_after: Duration::minutes(30),
            sweep_batch: 100,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            retry: RetryPolicy::new(config.max_attempts),
            public_base_url: config.public_base_url.clone(),
            stale_after: Duration::from_std(config.stale_job_timeout)
                .unwrap_or_else(|_| Self::default().stale_after),
            ..Self::default()
        }
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = RetryPolicy::new(max_attempts);
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Entry point for every job operation.
pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    stories: Arc<dyn StoryStore>,
    ledger: Arc<dyn QuotaLedger>,
    storage: Arc<dyn ObjectStorage>,
    worker: Arc<dyn WorkerClient>,
    settings: OrchestratorSettings,
    locks: JobLocks,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        stories: Arc<dyn StoryStore>,
        ledger: Arc<dyn QuotaLedger>,
        storage: Arc<dyn ObjectStorage>,
        worker: Arc<dyn WorkerClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            jobs,
            stories,
            ledger,
            storage,
            worker,
            settings,
            locks: JobLocks::new(),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn callback_url(&self, job_id: JobId) -> String {
        format!(
            "{}/callbacks/jobs/{}",
            self.settings.public_base_url.trim_end_matches('/'),
            job_id
        )
    }

    /// Best-effort: a lost release only over-counts until the period rolls.
    async fn release_reservation(&self, owner_id: UserId, job_id: JobId) {
        if let Err(err) = self.ledger.release(owner_id, job_id).await {
            warn!(job_id = %job_id, user_id = %owner_id, error = %err, "failed to release quota reservation");
        }
    }
}
