//! Wallet & Entitlement Store seam.
//!
//! The unlock gate and the expiry sweeper only need keyed account reads and
//! a handful of atomic mutations. [`WalletStore`] names exactly that surface
//! so the gate can run over something other than SQLite.

use chrono::{DateTime, Utc};

use entitle_store::{DebitOutcome, SlotGrant, Store, StoreError};
use entitle_types::{Account, AccountId, ContentId, ModelId};

use crate::error::LedgerError;

pub trait WalletStore {
    fn load_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    /// Atomic decrement guarded on `balance >= amount`.
    fn debit(&self, id: &AccountId, amount: i64) -> Result<DebitOutcome, StoreError>;

    /// Atomic increment. `None` if the account does not exist.
    fn credit(&self, id: &AccountId, amount: i64) -> Result<Option<i64>, StoreError>;

    /// Slot grant that only lands while the paid window still ends at
    /// `subscription_end`.
    fn grant_model(
        &self,
        id: &AccountId,
        model_id: &ModelId,
        limit: Option<u32>,
        subscription_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SlotGrant, StoreError>;

    /// `true` if newly granted.
    fn grant_content(
        &self,
        id: &AccountId,
        content_id: &ContentId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Downgrade only if the subscription still ends at `expected_end`.
    fn lapse_subscription(
        &self,
        id: &AccountId,
        expected_end: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

impl WalletStore for Store {
    fn load_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        self.account(id)
    }

    fn debit(&self, id: &AccountId, amount: i64) -> Result<DebitOutcome, StoreError> {
        Store::debit(self, id, amount)
    }

    fn credit(&self, id: &AccountId, amount: i64) -> Result<Option<i64>, StoreError> {
        Store::credit(self, id, amount)
    }

    fn grant_model(
        &self,
        id: &AccountId,
        model_id: &ModelId,
        limit: Option<u32>,
        subscription_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SlotGrant, StoreError> {
        Store::grant_model(self, id, model_id, limit, subscription_end, now)
    }

    fn grant_content(
        &self,
        id: &AccountId,
        content_id: &ContentId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Store::grant_content(self, id, content_id, now)
    }

    fn lapse_subscription(
        &self,
        id: &AccountId,
        expected_end: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Store::lapse_subscription(self, id, expected_end)
    }
}

fn positive(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::validation(format!(
            "amount must be positive (got {amount})"
        )));
    }
    Ok(())
}

/// Take `amount` from the wallet. Returns the new balance.
pub fn debit<S: WalletStore + ?Sized>(
    store: &S,
    id: &AccountId,
    amount: i64,
) -> Result<i64, LedgerError> {
    positive(amount)?;
    match store.debit(id, amount)? {
        DebitOutcome::Debited { balance } => Ok(balance),
        DebitOutcome::Insufficient { available } => Err(LedgerError::InsufficientBalance {
            required: amount,
            available,
        }),
        DebitOutcome::MissingAccount => Err(LedgerError::not_found("account", id)),
    }
}

/// Add `amount` to the wallet. Returns the new balance.
pub fn credit<S: WalletStore + ?Sized>(
    store: &S,
    id: &AccountId,
    amount: i64,
) -> Result<i64, LedgerError> {
    positive(amount)?;
    store
        .credit(id, amount)?
        .ok_or_else(|| LedgerError::not_found("account", id))
}

#[cfg(test)]
mod tests {
    use entitle_types::Role;

    use super::*;
    use crate::test_support::at;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .create_account(&AccountId::new("a1"), Role::User, "CODE0001", at(0))
            .unwrap();
        store
    }

    #[test]
    fn balance_never_goes_negative() {
        let store = store();
        let id = AccountId::new("a1");
        assert_eq!(credit(&store, &id, 40).unwrap(), 40);

        let err = debit(&store, &id, 50).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                required: 50,
                available: 40
            }
        ));
        assert_eq!(debit(&store, &id, 15).unwrap(), 25);
        assert_eq!(debit(&store, &id, 25).unwrap(), 0);
        assert!(matches!(
            debit(&store, &id, 1),
            Err(LedgerError::InsufficientBalance { available: 0, .. })
        ));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let store = store();
        let id = AccountId::new("a1");
        assert!(matches!(
            credit(&store, &id, 0),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            debit(&store, &id, -5),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn unknown_account_is_not_found() {
        let store = store();
        let ghost = AccountId::new("ghost");
        assert!(matches!(
            credit(&store, &ghost, 10),
            Err(LedgerError::NotFound { kind: "account", .. })
        ));
        assert!(matches!(
            debit(&store, &ghost, 10),
            Err(LedgerError::NotFound { kind: "account", .. })
        ));
    }
}
