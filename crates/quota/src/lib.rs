//! `datastory-quota`: tier limits and per-user usage counters.
//!
//! Pure data and comparison logic. Persistence and the atomic
//! check-and-reserve live in `datastory-infra`'s ledger adapters, which call
//! into the functions here while holding the owner's row lock.

pub mod error;
pub mod snapshot;
pub mod tier;

pub use error::QuotaError;
pub use snapshot::QuotaSnapshot;
pub use tier::{Allowance, Tier, TierLimits};
