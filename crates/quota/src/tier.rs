//! Pricing tiers and the limits they grant.

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::QuotaError;

/// Pricing plan that determines quota limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Professional,
    Business,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 4] = [
        Tier::Free,
        Tier::Professional,
        Tier::Business,
        Tier::Enterprise,
    ];

    /// Limits granted by this tier. Deterministic: same tier, same limits.
    pub fn limits(self) -> TierLimits {
        match self {
            Tier::Free => TierLimits {
                stories_per_period: Allowance::Limited(3),
                max_dataset_rows: 1_000,
                team_members: Allowance::Limited(1),
            },
            Tier::Professional => TierLimits {
                stories_per_period: Allowance::Limited(50),
                max_dataset_rows: 50_000,
                team_members: Allowance::Limited(1),
            },
            Tier::Business => TierLimits {
                stories_per_period: Allowance::Limited(200),
                max_dataset_rows: 250_000,
                team_members: Allowance::Limited(10),
            },
            Tier::Enterprise => TierLimits {
                stories_per_period: Allowance::Unlimited,
                max_dataset_rows: 1_000_000,
                team_members: Allowance::Unlimited,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Professional => "professional",
            Tier::Business => "business",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl core::fmt::Display for Tier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| QuotaError::UnknownTier(s.to_string()))
    }
}

/// A countable allowance. Serialized as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Allowance {
    Limited(u32),
    Unlimited,
}

impl Allowance {
    /// Whether one more unit fits given `used` units already consumed.
    pub fn permits_another(&self, used: u64) -> bool {
        match self {
            Allowance::Limited(limit) => used < u64::from(*limit),
            Allowance::Unlimited => true,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Allowance::Limited(n) => i64::from(*n),
            Allowance::Unlimited => -1,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self, QuotaError> {
        match value {
            -1 => Ok(Allowance::Unlimited),
            n if n >= 0 => u32::try_from(n)
                .map(Allowance::Limited)
                .map_err(|_| QuotaError::InvalidAllowance(n)),
            n => Err(QuotaError::InvalidAllowance(n)),
        }
    }
}

impl Serialize for Allowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for Allowance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Allowance::from_i64(raw).map_err(serde::de::Error::custom)
    }
}

/// Limits derived from a [`Tier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimits {
    pub stories_per_period: Allowance,
    pub max_dataset_rows: u64,
    pub team_members: Allowance,
}
