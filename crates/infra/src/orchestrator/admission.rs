//! Admission Controller.

use chrono::Utc;
use tracing::{info, instrument};

use datastory_core::{JobId, UserId};
use datastory_jobs::{DatasetFormat, Job, SourceHandle};

use super::{Orchestrator, OrchestratorError};
use crate::inspect::DatasetInspector;
use crate::storage::upload_key;

/// A candidate upload as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Passed to the worker unchanged.
    pub options: serde_json::Value,
}

/// Accept a file when its extension or its declared MIME type names a
/// supported tabular format.
pub fn accepted_format(file_name: &str, content_type: Option<&str>) -> Result<DatasetFormat, OrchestratorError> {
    DatasetFormat::from_extension(file_name)
        .or_else(|| content_type.and_then(DatasetFormat::from_mime))
        .ok_or_else(|| OrchestratorError::InvalidFileType(file_name.to_string()))
}

impl Orchestrator {
    /// Admit an upload and dispatch it.
    ///
    /// Checks run in order and stop at the first failure: file type, size,
    /// row count, then quota. Nothing is written before all of them pass.
    /// A dispatch failure does not fail the call; the returned job is
    /// `failed` with `DISPATCH_FAILED` instead.
    #[instrument(skip(self, upload), fields(user_id = %owner_id, file_name = %upload.file_name))]
    pub async fn submit(&self, owner_id: UserId, upload: Upload) -> Result<Job, OrchestratorError> {
        let now = Utc::now();

        let format = accepted_format(&upload.file_name, upload.content_type.as_deref())?;

        let size_bytes = upload.bytes.len() as u64;
        if size_bytes > self.settings.max_upload_bytes {
            return Err(OrchestratorError::FileTooLarge {
                size: size_bytes,
                limit: self.settings.max_upload_bytes,
            });
        }

        let shape = DatasetInspector::new(format).inspect(&upload.bytes)?;

        let job_id = JobId::new();
        self.ledger.try_reserve(owner_id, job_id, shape.rows, now).await?;

        let source = SourceHandle {
            storage_key: upload_key(owner_id, job_id, &upload.file_name),
            file_name: upload.file_name,
            format,
            size_bytes,
            row_count: shape.rows,
            column_count: shape.columns,
        };

        if let Err(err) = self.storage.put(&source.storage_key, upload.bytes).await {
            self.release_reservation(owner_id, job_id).await;
            return Err(err.into());
        }

        let storage_key = source.storage_key.clone();
        let job = Job::with_id(job_id, owner_id, source, upload.options, now);
        let job = match self.jobs.create(job).await {
            Ok(job) => job,
            Err(err) => {
                self.release_reservation(owner_id, job_id).await;
                let _ = self.storage.delete(&storage_key).await;
                return Err(err.into());
            }
        };

        info!(job_id = %job.id, rows = shape.rows, columns = shape.columns, "job admitted");

        let _guard = self.locks.acquire(job.id).await;
        self.dispatch(job).await
    }
}
