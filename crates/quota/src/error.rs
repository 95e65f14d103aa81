use chrono::{DateTime, Utc};
use thiserror::Error;

/// Quota and tier failures.
///
/// Rejections carry the concrete numbers so callers can render an actionable
/// upgrade prompt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuotaError {
    #[error("dataset has {rows} rows, which exceeds your plan limit of {limit} rows")]
    RowLimitExceeded { rows: u64, limit: u64 },

    #[error("story quota exhausted ({used} of {limit} used this period); resets at {reset_at}")]
    QuotaExceeded {
        used: u64,
        limit: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("invalid allowance {0}: expected -1 (unlimited) or a non-negative count")]
    InvalidAllowance(i64),
}
