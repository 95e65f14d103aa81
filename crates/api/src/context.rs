use datastory_core::UserId;
use datastory_quota::Tier;

/// Authenticated caller of a user-facing route.
///
/// Inserted by the auth middleware; every job, story and quota lookup is
/// scoped to this user.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
    tier: Tier,
}

impl UserContext {
    pub fn new(user_id: UserId, tier: Tier) -> Self {
        Self { user_id, tier }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }
}
