//! The quota ledger: owner records with atomic check-and-reserve.
//!
//! Admission reserves a story slot for the new job under the owner's lock;
//! the reservation counts against the period until the job either completes
//! (converted into a counted story) or fails (released). Each job is counted
//! at most once, so redelivered completions cannot double-increment.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use datastory_core::{JobId, UserId};
use datastory_quota::{QuotaError, QuotaSnapshot, Tier};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("no quota record for user {0}")]
    UnknownUser(UserId),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Provision the owner record on first sight and keep its tier in sync.
    async fn ensure_account(
        &self,
        user_id: UserId,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError>;

    /// Current quota state, after applying any due period rollover.
    async fn snapshot(&self, user_id: UserId, now: DateTime<Utc>) -> Result<QuotaSnapshot, LedgerError>;

    /// Check the row ceiling and the period allowance, then reserve a slot
    /// for `job_id`, all under the owner's lock.
    ///
    /// Reserving a job that already holds a reservation succeeds without
    /// taking a second slot.
    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: JobId,
        rows: u64,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError>;

    /// Reserve a slot for `job_id` against the period allowance only.
    ///
    /// Used when a job admitted earlier comes back for another attempt: its
    /// row count was accepted at admission and is not judged again.
    async fn reserve_slot(
        &self,
        user_id: UserId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError>;

    /// Drop the reservation held by `job_id`. Returns whether one existed.
    async fn release(&self, user_id: UserId, job_id: JobId) -> Result<bool, LedgerError>;

    /// Count `job_id` as a created story, consuming its reservation.
    ///
    /// Returns whether this call counted the job. A job is never counted twice.
    async fn record_completion(
        &self,
        user_id: UserId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;
}

#[derive(Debug)]
struct Account {
    snapshot: QuotaSnapshot,
    reserved: HashSet<JobId>,
}

impl Account {
    fn view(&self) -> QuotaSnapshot {
        let mut snapshot = self.snapshot.clone();
        snapshot.reserved = self.reserved.len() as u64;
        snapshot
    }
}

/// In-memory quota ledger for tests/dev.
///
/// Only open reservations are remembered. Counting consumes the reservation,
/// so a second completion for the same job finds none and counts nothing.
/// Assumes the job records live in the same process as the ledger.
#[derive(Debug, Default)]
pub struct InMemoryQuotaLedger {
    accounts: Mutex<HashMap<UserId, Account>>,
}

impl InMemoryQuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Overwrite the period counter (test setup).
    pub fn set_stories_this_period(&self, user_id: UserId, count: u64) -> Result<(), LedgerError> {
        self.with_account(user_id, None, |account| {
            account.snapshot.stories_this_period = count;
            Ok(())
        })
    }

    fn reserve(
        &self,
        user_id: UserId,
        job_id: JobId,
        rows: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        self.with_account(user_id, Some(now), |account| {
            if account.reserved.contains(&job_id) {
                return Ok(account.view());
            }
            let current = account.view();
            if let Some(rows) = rows {
                current.check_rows(rows)?;
            }
            current.check_story_slot()?;
            account.reserved.insert(job_id);
            Ok(account.view())
        })
    }

    fn with_account<T>(
        &self,
        user_id: UserId,
        now: Option<DateTime<Utc>>,
        f: impl FnOnce(&mut Account) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| LedgerError::Storage("ledger lock poisoned".to_string()))?;
        let account = accounts
            .get_mut(&user_id)
            .ok_or(LedgerError::UnknownUser(user_id))?;
        if let Some(now) = now {
            account.snapshot.roll_over(now);
        }
        f(account)
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn ensure_account(
        &self,
        user_id: UserId,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| LedgerError::Storage("ledger lock poisoned".to_string()))?;
        let account = accounts.entry(user_id).or_insert_with(|| Account {
            snapshot: QuotaSnapshot::new(user_id, tier, now),
            reserved: HashSet::new(),
        });
        if account.snapshot.tier != tier {
            account.snapshot.set_tier(tier);
        }
        account.snapshot.roll_over(now);
        Ok(account.view())
    }

    async fn snapshot(&self, user_id: UserId, now: DateTime<Utc>) -> Result<QuotaSnapshot, LedgerError> {
        self.with_account(user_id, Some(now), |account| Ok(account.view()))
    }

    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: JobId,
        rows: u64,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        self.reserve(user_id, job_id, Some(rows), now)
    }

    async fn reserve_slot(
        &self,
        user_id: UserId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        self.reserve(user_id, job_id, None, now)
    }

    async fn release(&self, user_id: UserId, job_id: JobId) -> Result<bool, LedgerError> {
        self.with_account(user_id, None, |account| Ok(account.reserved.remove(&job_id)))
    }

    async fn record_completion(
        &self,
        user_id: UserId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.with_account(user_id, Some(now), |account| {
            if !account.reserved.remove(&job_id) {
                return Ok(false);
            }
            account.snapshot.record_story();
            Ok(true)
        })
    }
}
