//! Unlock Gate: paid access grants outside the claim workflow.
//!
//! Model access comes from subscription slots (or VIP, which covers every
//! model without touching the unlock set). Content access is bought from the
//! wallet: debit first, grant second, and refund if the grant cannot be
//! recorded.

use entitle_store::SlotGrant;
use entitle_types::{Account, AccountId, ContentId, ModelId, ModelLimit, Tier};

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::sweeper;
use crate::wallet::{self, WalletStore};

/// Re-reads allowed when the subscription moves between the read and the grant.
const GRANT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlock {
    /// Newly granted by this call.
    Granted,
    /// Access already existed; nothing was charged or written.
    AlreadyHeld,
}

/// VIP or an explicit unlock.
#[must_use]
pub fn can_access_model(account: &Account, model_id: &ModelId) -> bool {
    account.is_vip() || account.has_model(model_id)
}

pub struct UnlockGate<'a, S: ?Sized> {
    store: &'a S,
    catalog: &'a Catalog,
    clock: &'a dyn Clock,
}

impl<'a, S: WalletStore + ?Sized> UnlockGate<'a, S> {
    pub fn new(store: &'a S, catalog: &'a Catalog, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            catalog,
            clock,
        }
    }

    pub fn unlock_model(&self, id: &AccountId, model_id: &ModelId) -> Result<Unlock, LedgerError> {
        let now = self.clock.now();
        for _ in 0..GRANT_ATTEMPTS {
            let account = sweeper::load_current(self.store, id, now)?;
            if can_access_model(&account, model_id) {
                return Ok(Unlock::AlreadyHeld);
            }
            if account.tier == Tier::Free {
                return Err(LedgerError::SubscriptionRequired {
                    required_tier: self.catalog.entry_tier(),
                });
            }
            let Some(subscription) = account.subscription.as_ref() else {
                return Err(LedgerError::Consistency(format!(
                    "account {id} is on tier {} without a subscription window",
                    account.tier
                )));
            };

            let limit = self.model_limit(&account)?.as_count();
            match self
                .store
                .grant_model(id, model_id, limit, subscription.end, now)?
            {
                SlotGrant::Granted => {
                    tracing::info!(account = %id, model = %model_id, "Model unlocked");
                    return Ok(Unlock::Granted);
                }
                SlotGrant::AlreadyHeld => return Ok(Unlock::AlreadyHeld),
                SlotGrant::LimitReached { limit } => {
                    return Err(LedgerError::SlotLimitReached { limit });
                }
                SlotGrant::SubscriptionChanged => {
                    tracing::debug!(account = %id, model = %model_id, "Subscription changed during unlock; re-reading");
                }
            }
        }
        tracing::warn!(account = %id, model = %model_id, "Subscription kept changing; unlock abandoned");
        Err(LedgerError::IoTimeout)
    }

    /// Charge `cost` from the wallet and grant the item, as one unit.
    pub fn unlock_content(
        &self,
        id: &AccountId,
        content_id: &ContentId,
        cost: i64,
    ) -> Result<Unlock, LedgerError> {
        if cost <= 0 {
            return Err(LedgerError::validation(format!(
                "content cost must be positive (got {cost})"
            )));
        }
        let now = self.clock.now();
        let account = sweeper::load_current(self.store, id, now)?;
        if account.has_content(content_id) {
            return Ok(Unlock::AlreadyHeld);
        }

        let balance = wallet::debit(self.store, id, cost)?;
        match self.store.grant_content(id, content_id, now) {
            Ok(true) => {
                tracing::info!(account = %id, content = %content_id, cost, balance, "Content unlocked");
                Ok(Unlock::Granted)
            }
            // A concurrent purchase delivered it first; this charge bought nothing.
            Ok(false) => {
                self.refund(id, cost)?;
                Ok(Unlock::AlreadyHeld)
            }
            Err(err) => {
                tracing::warn!(account = %id, content = %content_id, error = %err, "Content grant failed after debit");
                self.refund(id, cost)?;
                Err(err.into())
            }
        }
    }

    fn refund(&self, id: &AccountId, amount: i64) -> Result<(), LedgerError> {
        match self.store.credit(id, amount) {
            Ok(Some(balance)) => {
                tracing::info!(account = %id, amount, balance, "Content charge refunded");
                Ok(())
            }
            Ok(None) => Err(LedgerError::Consistency(format!(
                "account {id} vanished before a {amount} refund"
            ))),
            Err(err) => {
                tracing::error!(account = %id, amount, error = %err, "Refund failed; wallet needs manual credit");
                Err(LedgerError::Consistency(format!(
                    "refund of {amount} to account {id} failed"
                )))
            }
        }
    }

    fn model_limit(&self, account: &Account) -> Result<ModelLimit, LedgerError> {
        let package = account
            .subscription
            .as_ref()
            .and_then(|subscription| self.catalog.package(&subscription.package_id))
            .or_else(|| self.catalog.package_for_tier(account.tier))
            .ok_or_else(|| {
                LedgerError::Consistency(format!(
                    "no package in the catalog grants tier {}",
                    account.tier
                ))
            })?;
        Ok(package.model_limit)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::{DateTime, TimeDelta, Utc};

    use entitle_store::{DebitOutcome, Store, StoreError};
    use entitle_types::Role;

    use super::*;
    use crate::clock::ManualClock;
    use crate::test_support::{at, subscribe};

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .create_account(&AccountId::new("a1"), Role::User, "CODE0001", at(0))
            .unwrap();
        store
    }

    fn id() -> AccountId {
        AccountId::new("a1")
    }

    #[test]
    fn free_tier_needs_a_subscription() {
        let store = store();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        let gate = UnlockGate::new(&store, &catalog, &clock);

        let err = gate.unlock_model(&id(), &ModelId::new("m1")).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::SubscriptionRequired {
                required_tier: Tier::Tier1
            }
        ));
    }

    #[test]
    fn slots_follow_the_package_limit() {
        let store = store();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        subscribe(&store, &id(), "package1", at(0), TimeDelta::days(30));
        let gate = UnlockGate::new(&store, &catalog, &clock);

        for model in ["m1", "m2", "m3"] {
            assert_eq!(
                gate.unlock_model(&id(), &ModelId::new(model)).unwrap(),
                Unlock::Granted
            );
        }
        assert_eq!(
            gate.unlock_model(&id(), &ModelId::new("m2")).unwrap(),
            Unlock::AlreadyHeld
        );
        assert!(matches!(
            gate.unlock_model(&id(), &ModelId::new("m4")),
            Err(LedgerError::SlotLimitReached { limit: 3 })
        ));
    }

    #[test]
    fn vip_reaches_every_model_without_slots() {
        let store = store();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        subscribe(&store, &id(), "package3", at(0), TimeDelta::days(30));
        let gate = UnlockGate::new(&store, &catalog, &clock);

        assert_eq!(
            gate.unlock_model(&id(), &ModelId::new("anything")).unwrap(),
            Unlock::AlreadyHeld
        );
        let account = store.account(&id()).unwrap().unwrap();
        assert!(can_access_model(&account, &ModelId::new("m99")));
        assert!(account.unlocked_model_ids.is_empty());
    }

    #[test]
    fn expired_subscription_is_swept_before_unlocking() {
        let store = store();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        subscribe(&store, &id(), "package1", at(0), TimeDelta::days(30));
        let gate = UnlockGate::new(&store, &catalog, &clock);
        gate.unlock_model(&id(), &ModelId::new("m1")).unwrap();

        clock.advance(TimeDelta::days(31));
        assert!(matches!(
            gate.unlock_model(&id(), &ModelId::new("m2")),
            Err(LedgerError::SubscriptionRequired { .. })
        ));
        let account = store.account(&id()).unwrap().unwrap();
        assert!(account.unlocked_model_ids.is_empty());
    }

    #[test]
    fn short_wallet_leaves_everything_untouched() {
        let store = store();
        store.credit(&id(), 40).unwrap();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        let gate = UnlockGate::new(&store, &catalog, &clock);

        let err = gate
            .unlock_content(&id(), &ContentId::new("c1"), 50)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                required: 50,
                available: 40
            }
        ));
        let account = store.account(&id()).unwrap().unwrap();
        assert_eq!(account.wallet_balance, 40);
        assert!(!account.has_content(&ContentId::new("c1")));
    }

    #[test]
    fn owned_content_is_not_charged_again() {
        let store = store();
        store.credit(&id(), 100).unwrap();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        let gate = UnlockGate::new(&store, &catalog, &clock);

        let content = ContentId::new("c1");
        assert_eq!(gate.unlock_content(&id(), &content, 30).unwrap(), Unlock::Granted);
        assert_eq!(
            gate.unlock_content(&id(), &content, 30).unwrap(),
            Unlock::AlreadyHeld
        );
        assert_eq!(store.wallet_balance(&id()).unwrap(), Some(70));
    }

    /// Delegates to a real store but fails content grants on demand, or lapses
    /// the subscription right before a model grant.
    struct FlakyGrants<'a> {
        inner: &'a Store,
        fail_grants: Cell<bool>,
        lapse_before_grant: Cell<bool>,
    }

    impl<'a> FlakyGrants<'a> {
        fn new(inner: &'a Store) -> Self {
            Self {
                inner,
                fail_grants: Cell::new(false),
                lapse_before_grant: Cell::new(false),
            }
        }
    }

    impl WalletStore for FlakyGrants<'_> {
        fn load_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
            self.inner.load_account(id)
        }

        fn debit(&self, id: &AccountId, amount: i64) -> Result<DebitOutcome, StoreError> {
            WalletStore::debit(self.inner, id, amount)
        }

        fn credit(&self, id: &AccountId, amount: i64) -> Result<Option<i64>, StoreError> {
            WalletStore::credit(self.inner, id, amount)
        }

        fn grant_model(
            &self,
            id: &AccountId,
            model_id: &ModelId,
            limit: Option<u32>,
            subscription_end: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> Result<SlotGrant, StoreError> {
            if self.lapse_before_grant.get() {
                WalletStore::lapse_subscription(self.inner, id, subscription_end)?;
            }
            WalletStore::grant_model(self.inner, id, model_id, limit, subscription_end, now)
        }

        fn grant_content(
            &self,
            id: &AccountId,
            content_id: &ContentId,
            now: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            if self.fail_grants.get() {
                return Err(StoreError::Busy);
            }
            WalletStore::grant_content(self.inner, id, content_id, now)
        }

        fn lapse_subscription(
            &self,
            id: &AccountId,
            expected_end: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            WalletStore::lapse_subscription(self.inner, id, expected_end)
        }
    }

    #[test]
    fn failed_grant_refunds_the_debit() {
        let store = store();
        store.credit(&id(), 100).unwrap();
        let flaky = FlakyGrants::new(&store);
        flaky.fail_grants.set(true);
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        let gate = UnlockGate::new(&flaky, &catalog, &clock);

        let err = gate
            .unlock_content(&id(), &ContentId::new("c1"), 60)
            .unwrap_err();
        assert!(err.is_retryable());
        let account = store.account(&id()).unwrap().unwrap();
        assert_eq!(account.wallet_balance, 100);
        assert!(account.unlocked_content_ids.is_empty());

        flaky.fail_grants.set(false);
        assert_eq!(
            gate.unlock_content(&id(), &ContentId::new("c1"), 60).unwrap(),
            Unlock::Granted
        );
        assert_eq!(store.wallet_balance(&id()).unwrap(), Some(40));
    }

    #[test]
    fn lapse_between_read_and_grant_leaves_no_slot() {
        let store = store();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        subscribe(&store, &id(), "package1", at(0), TimeDelta::days(30));
        let flaky = FlakyGrants::new(&store);
        flaky.lapse_before_grant.set(true);
        let gate = UnlockGate::new(&flaky, &catalog, &clock);

        let err = gate.unlock_model(&id(), &ModelId::new("m1")).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::SubscriptionRequired {
                required_tier: Tier::Tier1
            }
        ));
        let account = store.account(&id()).unwrap().unwrap();
        assert_eq!(account.tier, Tier::Free);
        assert!(account.unlocked_model_ids.is_empty());
        assert!(!can_access_model(&account, &ModelId::new("m1")));
    }

    #[test]
    fn stale_window_is_refused_but_a_fresh_read_unlocks() {
        let store = store();
        let catalog = Catalog::builtin().unwrap();
        let clock = ManualClock::new(at(1));
        subscribe(&store, &id(), "package1", at(0), TimeDelta::days(30));
        let stale_end = at(0) + TimeDelta::days(30);
        subscribe(&store, &id(), "package1", stale_end, TimeDelta::days(30));

        assert_eq!(
            store
                .grant_model(&id(), &ModelId::new("m1"), Some(3), stale_end, at(1))
                .unwrap(),
            SlotGrant::SubscriptionChanged
        );
        let gate = UnlockGate::new(&store, &catalog, &clock);
        assert_eq!(
            gate.unlock_model(&id(), &ModelId::new("m1")).unwrap(),
            Unlock::Granted
        );
    }
}
