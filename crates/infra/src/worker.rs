//! Client side of the analysis worker contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use datastory_core::{JobId, UserId};
use datastory_jobs::{Job, SourceHandle};

/// Body of `POST {worker}/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub job_id: JobId,
    pub user_id: UserId,
    /// Storage key of the uploaded dataset.
    pub file_url: String,
    pub attempt: u32,
    pub source: SourceHandle,
    pub options: serde_json::Value,
    pub callback_url: String,
}

impl AnalysisRequest {
    pub fn for_job(job: &Job, callback_url: String) -> Self {
        Self {
            job_id: job.id,
            user_id: job.owner_id,
            file_url: job.source.storage_key.clone(),
            attempt: job.attempts,
            source: job.source.clone(),
            options: job.options.clone(),
            callback_url,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("worker did not acknowledge within {0:?}")]
    Timeout(Duration),

    #[error("worker unreachable: {0}")]
    Transport(String),

    #[error("worker rejected the job with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Hands a job to the analysis worker. Must return once the worker has
/// acknowledged receipt; never waits for the analysis itself.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn submit(&self, request: &AnalysisRequest) -> Result<(), DispatchError>;
}

/// Worker client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpWorkerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/analyze", base_url.trim_end_matches('/')),
            timeout,
        })
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn submit(&self, request: &AnalysisRequest) -> Result<(), DispatchError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(self.timeout)
                } else {
                    DispatchError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body: String = resp.text().await.unwrap_or_default().chars().take(512).collect();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Worker client that records requests instead of sending them.
#[derive(Debug, Default)]
pub struct InMemoryWorkerClient {
    requests: Mutex<Vec<AnalysisRequest>>,
    failing: AtomicBool,
}

impl InMemoryWorkerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// While set, every submission fails as if the worker were down.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WorkerClient for InMemoryWorkerClient {
    async fn submit(&self, request: &AnalysisRequest) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("connection refused".to_string()));
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }
}
