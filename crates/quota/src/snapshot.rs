//! Per-user usage counters and the admission comparisons over them.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use datastory_core::UserId;

use crate::error::QuotaError;
use crate::tier::{Allowance, Tier, TierLimits};

/// Length of one quota period.
pub const PERIOD: Months = Months::new(1);

/// Quota fields of an owner record.
///
/// `stories_this_period` and `total_stories_created` are only ever advanced by
/// [`QuotaSnapshot::record_story`], which the finalizer calls once per
/// completed job. `reserved` counts admitted jobs whose outcome is still open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub user_id: UserId,
    pub tier: Tier,
    pub limits: TierLimits,
    pub stories_this_period: u64,
    pub total_stories_created: u64,
    pub period_reset_at: DateTime<Utc>,
    pub reserved: u64,
}

impl QuotaSnapshot {
    /// A fresh owner record whose first period starts at `now`.
    pub fn new(user_id: UserId, tier: Tier, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tier,
            limits: tier.limits(),
            stories_this_period: 0,
            total_stories_created: 0,
            period_reset_at: next_boundary(now, now),
            reserved: 0,
        }
    }

    /// Switch tier; limits follow deterministically.
    pub fn set_tier(&mut self, tier: Tier) {
        self.tier = tier;
        self.limits = tier.limits();
    }

    /// Apply a period rollover if `period_reset_at` has passed.
    ///
    /// Returns `true` when the counter was reset.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.period_reset_at {
            return false;
        }
        self.stories_this_period = 0;
        self.period_reset_at = next_boundary(self.period_reset_at, now);
        true
    }

    /// Stories counted against the current period, including open reservations.
    pub fn used(&self) -> u64 {
        self.stories_this_period.saturating_add(self.reserved)
    }

    pub fn check_rows(&self, rows: u64) -> Result<(), QuotaError> {
        if rows > self.limits.max_dataset_rows {
            return Err(QuotaError::RowLimitExceeded {
                rows,
                limit: self.limits.max_dataset_rows,
            });
        }
        Ok(())
    }

    pub fn check_story_slot(&self) -> Result<(), QuotaError> {
        let used = self.used();
        match self.limits.stories_per_period {
            allowance if allowance.permits_another(used) => Ok(()),
            Allowance::Limited(limit) => Err(QuotaError::QuotaExceeded {
                used,
                limit,
                reset_at: self.period_reset_at,
            }),
            Allowance::Unlimited => Ok(()),
        }
    }

    /// Count one finished story against the period and the lifetime total.
    pub fn record_story(&mut self) {
        self.stories_this_period = self.stories_this_period.saturating_add(1);
        self.total_stories_created = self.total_stories_created.saturating_add(1);
    }
}

/// Advance `from` by whole periods until it lies strictly after `now`.
fn next_boundary(from: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut boundary = from;
    while boundary <= now {
        match boundary.checked_add_months(PERIOD) {
            Some(next) => boundary = next,
            None => break,
        }
    }
    boundary
}
