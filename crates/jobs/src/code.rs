use serde::{Deserialize, Serialize};

/// Machine-readable error codes produced by the orchestration core.
///
/// Worker-reported codes are stored verbatim on the job and are not part of
/// this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidFileType,
    FileTooLarge,
    RowLimitExceeded,
    QuotaExceeded,
    UnreadableDataset,
    StorageFailed,
    DispatchFailed,
    JobTimeout,
    MaxRetriesExceeded,
    JobNotRetryable,
    JobNotFound,
    StoryNotFound,
    Forbidden,
    InconsistentState,
    InvalidCallback,
    InvalidUpload,
    Unauthenticated,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidFileType => "INVALID_FILE_TYPE",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::RowLimitExceeded => "ROW_LIMIT_EXCEEDED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::UnreadableDataset => "UNREADABLE_DATASET",
            ErrorCode::StorageFailed => "STORAGE_FAILED",
            ErrorCode::DispatchFailed => "DISPATCH_FAILED",
            ErrorCode::JobTimeout => "JOB_TIMEOUT",
            ErrorCode::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ErrorCode::JobNotRetryable => "JOB_NOT_RETRYABLE",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::StoryNotFound => "STORY_NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InconsistentState => "INCONSISTENT_STATE",
            ErrorCode::InvalidCallback => "INVALID_CALLBACK",
            ErrorCode::InvalidUpload => "INVALID_UPLOAD",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
