use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use datastory_core::JobId;

/// Per-job mutual exclusion for the orchestrator's write paths.
///
/// Entries are dropped once no task holds or waits on them.
#[derive(Debug, Default)]
pub struct JobLocks {
    inner: Mutex<HashMap<JobId, Arc<AsyncMutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, job_id: JobId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(job_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of jobs with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
