//! Entitlement & wallet ledger.
//!
//! Turns approved payment claims into account privileges and referral
//! commissions. [`Ledger`] is the entry point for UI and admin callers; the
//! modules below it are usable on their own for callers that bring their own
//! store or clock.
//!
//! Invariants held across the crate:
//! - a purchase or withdrawal request leaves Pending exactly once
//! - a wallet balance is never negative
//! - an expired subscription is downgraded on the next access to the account
//! - a content charge is refunded if the item cannot be granted

mod approval;
mod catalog;
mod clock;
mod error;
mod purchases;
mod referral;
mod stats;
mod sweeper;
mod unlock;
mod wallet;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use entitle_config::EntitleConfig;
use entitle_store::{CreateAccount, Store, StoreError};
use entitle_types::{
    Account, AccountId, AccountSummary, AdminStats, Beneficiary, CommissionRecord, ContentId,
    Influencer, InfluencerId, ModelId, NewPurchase, PayoutMethod, PurchaseId, PurchaseRequest,
    PurchaseStatus, Role, WithdrawalId, WithdrawalRequest, WithdrawalStatus,
};

pub use approval::Approval;
pub use catalog::{Catalog, CatalogError, Grant};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LedgerError;
pub use purchases::Purchases;
pub use referral::{CommissionQuote, ReferralPolicy};
pub use stats::StatsCache;
pub use sweeper::load_current;
pub use unlock::{Unlock, UnlockGate, can_access_model};
pub use wallet::WalletStore;

const REFERRAL_CODE_LEN: usize = 8;
const REFERRAL_CODE_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("no database path configured and no home directory to default to")]
    NoDatabasePath,
    #[error("invalid catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("failed to open ledger database: {0}")]
    Store(#[from] StoreError),
}

/// The ledger as seen by one session.
///
/// Owns a single store connection. Sessions that need to run concurrently
/// open their own `Ledger` on the same database file.
pub struct Ledger {
    store: Store,
    catalog: Catalog,
    policy: ReferralPolicy,
    clock: Arc<dyn Clock>,
    stats: StatsCache,
}

impl Ledger {
    #[must_use]
    pub fn new(
        store: Store,
        catalog: Catalog,
        policy: ReferralPolicy,
        clock: Arc<dyn Clock>,
        stats_ttl: Duration,
    ) -> Self {
        Self {
            store,
            catalog,
            policy,
            clock,
            stats: StatsCache::new(stats_ttl),
        }
    }

    /// Open the configured database file.
    pub fn open(config: &EntitleConfig, clock: Arc<dyn Clock>) -> Result<Self, OpenError> {
        let path: PathBuf = config.store_path().ok_or(OpenError::NoDatabasePath)?;
        let store = Store::open(&path, config.busy_timeout())?;
        Self::with_store(store, config, clock)
    }

    /// Wrap an already-open store with the configured catalog and policy.
    pub fn with_store(
        store: Store,
        config: &EntitleConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OpenError> {
        let catalog = Catalog::from_config(config.catalog())?;
        let policy = ReferralPolicy {
            peer_commission_percent: config.peer_commission_percent(),
            withdrawal_minimum: config.withdrawal_minimum(),
        };
        Ok(Self::new(store, catalog, policy, clock, config.stats_ttl()))
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn policy(&self) -> &ReferralPolicy {
        &self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn gate(&self) -> UnlockGate<'_, Store> {
        UnlockGate::new(&self.store, &self.catalog, self.clock.as_ref())
    }

    // ── Accounts ────────────────────────────────────────────────────────

    /// Return the account, creating it with a fresh referral code on first use.
    pub fn ensure_account(&self, id: &AccountId, role: Role) -> Result<Account, LedgerError> {
        if id.as_str().trim().is_empty() {
            return Err(LedgerError::validation("account id must not be blank"));
        }
        let now = self.now();
        if self.store.account(id)?.is_some() {
            return sweeper::load_current(&self.store, id, now);
        }

        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = generate_referral_code();
            match self.store.create_account(id, role, &code, now)? {
                CreateAccount::Created => {
                    tracing::info!(account = %id, role = role.as_str(), code = %code, "Account created");
                    self.stats.invalidate();
                    return sweeper::load_current(&self.store, id, now);
                }
                CreateAccount::AlreadyExists => {
                    return sweeper::load_current(&self.store, id, now);
                }
                CreateAccount::CodeTaken => {}
            }
        }
        Err(LedgerError::Consistency(format!(
            "could not allocate a unique referral code for account {id}"
        )))
    }

    /// Current account state plus how many accounts it has referred.
    pub fn account_summary(&self, id: &AccountId) -> Result<AccountSummary, LedgerError> {
        let account = sweeper::load_current(&self.store, id, self.now())?;
        let referrals_count = self.store.referrals_count(id)?;
        Ok(AccountSummary {
            account,
            referrals_count,
        })
    }

    /// Every account, newest first, with lapsed subscriptions swept.
    pub fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let now = self.now();
        self.store
            .list_accounts()?
            .into_iter()
            .map(|account| {
                if account.subscription_lapsed(now) {
                    sweeper::load_current(&self.store, &account.id, now)
                } else {
                    Ok(account)
                }
            })
            .collect()
    }

    pub fn credit(&self, id: &AccountId, amount: i64) -> Result<i64, LedgerError> {
        let balance = wallet::credit(&self.store, id, amount)?;
        tracing::info!(account = %id, amount, balance, "Wallet credited");
        Ok(balance)
    }

    pub fn debit(&self, id: &AccountId, amount: i64) -> Result<i64, LedgerError> {
        let balance = wallet::debit(&self.store, id, amount)?;
        tracing::info!(account = %id, amount, balance, "Wallet debited");
        Ok(balance)
    }

    // ── Purchases ───────────────────────────────────────────────────────

    pub fn submit_purchase(&self, claim: NewPurchase) -> Result<PurchaseRequest, LedgerError> {
        let request = purchases::submit(&self.store, &self.catalog, &self.policy, claim, self.now())?;
        self.stats.invalidate();
        Ok(request)
    }

    pub fn purchase(&self, id: &PurchaseId) -> Result<PurchaseRequest, LedgerError> {
        self.store
            .purchase(id)?
            .ok_or_else(|| LedgerError::not_found("purchase", id))
    }

    /// Lazy most-recent-first listing, optionally filtered by status.
    #[must_use]
    pub fn purchases(&self, status: Option<PurchaseStatus>) -> Purchases<'_> {
        Purchases::new(&self.store, status)
    }

    pub fn approve_purchase(&self, id: &PurchaseId) -> Result<Approval, LedgerError> {
        let approval = approval::approve(&self.store, &self.catalog, &self.policy, id, self.now());
        self.stats.invalidate();
        approval
    }

    pub fn reject_purchase(&self, id: &PurchaseId) -> Result<(), LedgerError> {
        approval::reject(&self.store, id, self.now())?;
        self.stats.invalidate();
        Ok(())
    }

    pub fn commission_for_purchase(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<CommissionRecord>, LedgerError> {
        Ok(self.store.commission_for_purchase(id)?)
    }

    // ── Unlocks ─────────────────────────────────────────────────────────

    pub fn can_access_model(&self, id: &AccountId, model_id: &ModelId) -> Result<bool, LedgerError> {
        let account = sweeper::load_current(&self.store, id, self.now())?;
        Ok(can_access_model(&account, model_id))
    }

    pub fn unlock_model(&self, id: &AccountId, model_id: &ModelId) -> Result<Unlock, LedgerError> {
        self.gate().unlock_model(id, model_id)
    }

    pub fn unlock_content(
        &self,
        id: &AccountId,
        content_id: &ContentId,
        cost: i64,
    ) -> Result<Unlock, LedgerError> {
        self.gate().unlock_content(id, content_id, cost)
    }

    // ── Referrals ───────────────────────────────────────────────────────

    pub fn create_influencer(
        &self,
        name: &str,
        code: &str,
        commission_rate_percent: u32,
    ) -> Result<Influencer, LedgerError> {
        referral::create_influencer(&self.store, name, code, commission_rate_percent, self.now())
    }

    pub fn set_influencer_active(&self, id: &InfluencerId, active: bool) -> Result<(), LedgerError> {
        referral::set_influencer_active(&self.store, id, active)
    }

    pub fn list_influencers(&self) -> Result<Vec<Influencer>, LedgerError> {
        Ok(self.store.list_influencers()?)
    }

    pub fn request_withdrawal(
        &self,
        beneficiary: Beneficiary,
        amount: Option<i64>,
        payout_method: PayoutMethod,
        payout_number: &str,
    ) -> Result<WithdrawalRequest, LedgerError> {
        referral::request_withdrawal(
            &self.store,
            &self.policy,
            beneficiary,
            amount,
            payout_method,
            payout_number,
            self.now(),
        )
    }

    pub fn approve_withdrawal(&self, id: &WithdrawalId) -> Result<(), LedgerError> {
        referral::approve_withdrawal(&self.store, id, self.now())?;
        self.stats.invalidate();
        Ok(())
    }

    pub fn reject_withdrawal(&self, id: &WithdrawalId) -> Result<(), LedgerError> {
        referral::reject_withdrawal(&self.store, id, self.now())
    }

    pub fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        Ok(self.store.list_withdrawals(status)?)
    }

    // ── Statistics ──────────────────────────────────────────────────────

    pub fn admin_stats(&self) -> Result<AdminStats, LedgerError> {
        self.stats
            .get_or_load(self.now(), || Ok(self.store.admin_stats()?))
    }
}

fn generate_referral_code() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..REFERRAL_CODE_LEN].to_ascii_uppercase()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use entitle_store::{ApprovalEffects, Resolution, Store};
    use entitle_types::{
        AccountId, PackageId, PurchaseId, PurchaseKind, PurchaseRequest, PurchaseStatus,
        Subscription,
    };

    use crate::Catalog;

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Give `id` an approved subscription to a builtin package.
    pub(crate) fn subscribe(
        store: &Store,
        id: &AccountId,
        package: &str,
        start: DateTime<Utc>,
        length: TimeDelta,
    ) {
        let catalog = Catalog::builtin().unwrap();
        let package_id = PackageId::new(package);
        let tier = catalog.package(&package_id).expect("builtin package").tier;
        let purchase_id = PurchaseId::new(format!("sub-{id}-{package}-{}", start.timestamp()));

        store
            .insert_purchase(&PurchaseRequest {
                id: purchase_id.clone(),
                account_id: id.clone(),
                kind: PurchaseKind::PackageSubscription {
                    package_id: package_id.clone(),
                },
                amount: 1,
                transaction_reference: format!("TRX-{purchase_id}"),
                payer_number: "01700000000".to_string(),
                referral_code: None,
                status: PurchaseStatus::Pending,
                submitted_at: start,
                resolved_at: None,
            })
            .unwrap();
        let outcome = store
            .apply_approval(&ApprovalEffects {
                purchase_id,
                account_id: id.clone(),
                credits: 0,
                subscription: Some((
                    tier,
                    Subscription {
                        package_id,
                        start,
                        end: start + length,
                    },
                )),
                commission: None,
                resolved_at: start,
            })
            .unwrap();
        assert_eq!(outcome, Resolution::Resolved);
    }
}
