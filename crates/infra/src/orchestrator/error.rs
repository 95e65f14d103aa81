use thiserror::Error;

use datastory_core::{JobId, StoryId};
use datastory_jobs::{ErrorCode, TransitionError};
use datastory_quota::QuotaError;

use crate::inspect::InspectError;
use crate::storage::StorageError;
use crate::store::{JobStoreError, LedgerError, StoryStoreError};

/// Everything an orchestrator operation can reject with.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unsupported file type for {0:?}; upload a .csv or .tsv file")]
    InvalidFileType(String),

    #[error("file is {size} bytes, which exceeds the upload limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("dataset could not be read: {0}")]
    UnreadableDataset(#[from] InspectError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("story not found: {0}")]
    StoryNotFound(StoryId),

    #[error("not allowed to access this resource")]
    Forbidden,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    #[error("failed to store upload: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::InvalidFileType(_) => ErrorCode::InvalidFileType,
            OrchestratorError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            OrchestratorError::UnreadableDataset(_) => ErrorCode::UnreadableDataset,
            OrchestratorError::Quota(QuotaError::RowLimitExceeded { .. }) => ErrorCode::RowLimitExceeded,
            OrchestratorError::Quota(QuotaError::QuotaExceeded { .. }) => ErrorCode::QuotaExceeded,
            OrchestratorError::Quota(_) => ErrorCode::InternalError,
            OrchestratorError::JobNotFound(_) => ErrorCode::JobNotFound,
            OrchestratorError::StoryNotFound(_) => ErrorCode::StoryNotFound,
            OrchestratorError::Forbidden => ErrorCode::Forbidden,
            OrchestratorError::Transition(e) => e.code(),
            OrchestratorError::InvalidCallback(_) => ErrorCode::InvalidCallback,
            OrchestratorError::Storage(_) => ErrorCode::StorageFailed,
            OrchestratorError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<JobStoreError> for OrchestratorError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => OrchestratorError::JobNotFound(id),
            JobStoreError::Transition(e) => OrchestratorError::Transition(e),
            other => OrchestratorError::Internal(other.to_string()),
        }
    }
}

impl From<StoryStoreError> for OrchestratorError {
    fn from(err: StoryStoreError) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

impl From<LedgerError> for OrchestratorError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Quota(e) => OrchestratorError::Quota(e),
            other => OrchestratorError::Internal(other.to_string()),
        }
    }
}
