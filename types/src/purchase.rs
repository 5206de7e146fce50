use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EnumKind, EnumParseError};
use crate::ids::{AccountId, CreditPackId, PackageId, PurchaseId};

/// What a payment claim buys. Decided once at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseKind {
    PackageSubscription { package_id: PackageId },
    CreditTopUp { credit_pack_id: CreditPackId },
}

impl PurchaseKind {
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            PurchaseKind::PackageSubscription { .. } => "package",
            PurchaseKind::CreditTopUp { .. } => "credits",
        }
    }

    /// Catalog key the claim refers to.
    #[must_use]
    pub fn target_id(&self) -> &str {
        match self {
            PurchaseKind::PackageSubscription { package_id } => package_id.as_str(),
            PurchaseKind::CreditTopUp { credit_pack_id } => credit_pack_id.as_str(),
        }
    }

    /// Rebuild from the stored `(tag, target)` pair.
    pub fn from_parts(tag: &str, target: &str) -> Result<Self, EnumParseError> {
        match tag {
            "package" => Ok(PurchaseKind::PackageSubscription {
                package_id: PackageId::new(target),
            }),
            "credits" => Ok(PurchaseKind::CreditTopUp {
                credit_pack_id: CreditPackId::new(target),
            }),
            _ => Err(EnumParseError::new(
                EnumKind::PurchaseKind,
                tag,
                &["package", "credits"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Approved,
    Rejected,
}

impl PurchaseStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Approved => "approved",
            PurchaseStatus::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "approved" => Ok(PurchaseStatus::Approved),
            "rejected" => Ok(PurchaseStatus::Rejected),
            _ => Err(EnumParseError::new(
                EnumKind::PurchaseStatus,
                s,
                &["pending", "approved", "rejected"],
            )),
        }
    }
}

/// A manually submitted mobile-money payment claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: PurchaseId,
    pub account_id: AccountId,
    pub kind: PurchaseKind,
    /// Amount the payer claims to have sent, in minor currency units.
    pub amount: i64,
    pub transaction_reference: String,
    pub payer_number: String,
    pub referral_code: Option<String>,
    pub status: PurchaseStatus,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Client input for a new claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub account_id: AccountId,
    pub kind: PurchaseKind,
    pub amount: i64,
    pub transaction_reference: String,
    pub payer_number: String,
    pub referral_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_stored_parts() {
        let kind = PurchaseKind::CreditTopUp {
            credit_pack_id: CreditPackId::new("credits_300"),
        };
        let rebuilt = PurchaseKind::from_parts(kind.tag(), kind.target_id()).unwrap();
        assert_eq!(rebuilt, kind);
        assert!(PurchaseKind::from_parts("generic_item", "x").is_err());
    }

    #[test]
    fn kind_serializes_tagged() {
        let kind = PurchaseKind::PackageSubscription {
            package_id: PackageId::new("package1"),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "package_subscription");
        assert_eq!(json["package_id"], "package1");
    }
}
