//! Core domain types for the entitlement ledger.
//!
//! This crate contains pure domain types with no IO and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod account;
mod catalog;
mod enums;
mod ids;
mod purchase;
mod referral;

pub use account::{Account, AccountSummary, Role, Subscription};
pub use catalog::{CreditPack, ModelLimit, Package, Tier};
pub use enums::{EnumKind, EnumParseError};
pub use ids::{
    AccountId, CommissionId, ContentId, CreditPackId, InfluencerId, ModelId, PackageId,
    PurchaseId, WithdrawalId,
};
pub use purchase::{NewPurchase, PurchaseKind, PurchaseRequest, PurchaseStatus};
pub use referral::{
    Beneficiary, CommissionRecord, Influencer, PayoutMethod, WithdrawalRequest, WithdrawalStatus,
};

use serde::Serialize;

// ============================================================================
// Admin Statistics
// ============================================================================

/// Aggregate figures for the admin dashboard, in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AdminStats {
    pub total_accounts: u64,
    pub pending_purchases: u64,
    /// Sum of approved purchase amounts.
    pub total_revenue: i64,
    /// Sum of all commission records.
    pub total_commission: i64,
    /// Sum of paid withdrawals.
    pub commission_paid: i64,
}

impl AdminStats {
    /// Commission attributed but not yet paid out.
    #[must_use]
    pub const fn commission_owed(&self) -> i64 {
        self.total_commission - self.commission_paid
    }

    #[must_use]
    pub const fn net_income(&self) -> i64 {
        self.total_revenue - self.total_commission
    }
}
