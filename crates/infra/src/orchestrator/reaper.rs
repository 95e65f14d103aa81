//! Times out jobs that stay in `processing` without hearing from the worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use datastory_jobs::JobTransition;

use super::{Orchestrator, OrchestratorError};

impl Orchestrator {
    /// Fail every `processing` job idle since before `now - stale_after`
    /// with `JOB_TIMEOUT`. Returns how many jobs were timed out.
    pub async fn reap_stale(&self, now: DateTime<Utc>) -> Result<usize, OrchestratorError> {
        let cutoff = now - self.settings.stale_after;
        let stale = self.jobs.list_stale(cutoff, self.settings.sweep_batch).await?;

        let mut reaped = 0;
        for job_id in stale {
            let _guard = self.locks.acquire(job_id).await;
            match self
                .jobs
                .transition(job_id, JobTransition::TimeOut { cutoff }, now)
                .await
            {
                Ok(t) if t.outcome.is_applied() => {
                    self.release_reservation(t.job.owner_id, job_id).await;
                    warn!(job_id = %job_id, attempt = t.job.attempts, "job timed out waiting for the worker");
                    reaped += 1;
                }
                Ok(_) => {}
                Err(err) => warn!(job_id = %job_id, error = %err, "failed to time out stale job"),
            }
        }
        Ok(reaped)
    }
}

/// Handle to stop a running reaper.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    /// Request shutdown and wait for the sweep loop to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.join.await;
    }
}

/// Periodic stale-job sweep.
#[derive(Debug)]
pub struct StaleJobReaper;

impl StaleJobReaper {
    pub fn spawn(orchestrator: Arc<Orchestrator>, interval: Duration) -> ReaperHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "stale job reaper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        info!("stale job reaper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match orchestrator.reap_stale(Utc::now()).await {
                            Ok(0) => debug!("no stale jobs"),
                            Ok(reaped) => info!(reaped, "timed out stale jobs"),
                            Err(err) => warn!(error = %err, "stale job sweep failed"),
                        }
                    }
                }
            }
        });

        ReaperHandle { shutdown, join }
    }
}
