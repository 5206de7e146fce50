use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Tier;
use crate::enums::{EnumKind, EnumParseError};
use crate::ids::{AccountId, ContentId, ModelId, PackageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(EnumParseError::new(EnumKind::Role, s, &["user", "admin"])),
        }
    }
}

/// The subscription window an account currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub package_id: PackageId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Per-account wallet and entitlement state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Never negative.
    pub wallet_balance: i64,
    pub tier: Tier,
    /// `None` whenever `tier` is `Free`.
    pub subscription: Option<Subscription>,
    /// Per-tier model slots. Cleared when the subscription lapses.
    pub unlocked_model_ids: BTreeSet<ModelId>,
    /// Purchased content. Only ever grows.
    pub unlocked_content_ids: BTreeSet<ContentId>,
    pub referral_code: String,
    pub referred_by: Option<AccountId>,
    pub commission_earnings: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn is_vip(&self) -> bool {
        self.tier == Tier::Vip
    }

    /// True when a paid subscription's window closed before `now`.
    #[must_use]
    pub fn subscription_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.tier.is_paid()
            && self
                .subscription
                .as_ref()
                .is_some_and(|subscription| now > subscription.end)
    }

    #[must_use]
    pub fn has_model(&self, model_id: &ModelId) -> bool {
        self.unlocked_model_ids.contains(model_id)
    }

    #[must_use]
    pub fn has_content(&self, content_id: &ContentId) -> bool {
        self.unlocked_content_ids.contains(content_id)
    }
}

/// Read model returned to account pages and the admin user table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub account: Account,
    pub referrals_count: u64,
}
