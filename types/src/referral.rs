//! Commission, influencer, and payout records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EnumKind, EnumParseError};
use crate::ids::{AccountId, CommissionId, InfluencerId, PurchaseId, WithdrawalId};

/// Who receives a commission or a payout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Beneficiary {
    Influencer(InfluencerId),
    Account(AccountId),
}

impl Beneficiary {
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Beneficiary::Influencer(_) => "influencer",
            Beneficiary::Account(_) => "account",
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Beneficiary::Influencer(id) => id.as_str(),
            Beneficiary::Account(id) => id.as_str(),
        }
    }

    pub fn from_parts(tag: &str, id: &str) -> Result<Self, EnumParseError> {
        match tag {
            "influencer" => Ok(Beneficiary::Influencer(InfluencerId::new(id))),
            "account" => Ok(Beneficiary::Account(AccountId::new(id))),
            _ => Err(EnumParseError::new(
                EnumKind::Beneficiary,
                tag,
                &["influencer", "account"],
            )),
        }
    }
}

impl fmt::Display for Beneficiary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag(), self.id())
    }
}

/// Written once by the approval engine, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub id: CommissionId,
    /// Unique: at most one record per purchase request.
    pub purchase_id: PurchaseId,
    pub beneficiary: Beneficiary,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Influencer {
    pub id: InfluencerId,
    pub name: String,
    pub code: String,
    pub commission_rate_percent: u32,
    pub active: bool,
    pub cumulative_earnings: i64,
    pub cumulative_paid: i64,
}

impl Influencer {
    /// Earned but not yet paid out.
    #[must_use]
    pub fn available_earnings(&self) -> i64 {
        self.cumulative_earnings - self.cumulative_paid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutMethod {
    Bkash,
    Nagad,
}

impl PayoutMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PayoutMethod::Bkash => "bkash",
            PayoutMethod::Nagad => "nagad",
        }
    }
}

impl fmt::Display for PayoutMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutMethod::Bkash => f.write_str("Bkash"),
            PayoutMethod::Nagad => f.write_str("Nagad"),
        }
    }
}

impl FromStr for PayoutMethod {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bkash" => Ok(PayoutMethod::Bkash),
            "nagad" => Ok(PayoutMethod::Nagad),
            _ => Err(EnumParseError::new(
                EnumKind::PayoutMethod,
                s,
                &["bkash", "nagad"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
    Rejected,
}

impl WithdrawalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "paid" => Ok(WithdrawalStatus::Paid),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            _ => Err(EnumParseError::new(
                EnumKind::WithdrawalStatus,
                s,
                &["pending", "paid", "rejected"],
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub beneficiary: Beneficiary,
    pub amount: i64,
    pub payout_method: PayoutMethod,
    pub payout_number: String,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
