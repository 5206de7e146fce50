//! Expiry Sweeper.
//!
//! Every read of an account goes through [`load_current`]. A paid tier whose
//! window has closed is downgraded on the spot, so callers never see a stale
//! tier. The downgrade is a compare-and-swap on the subscription end: an
//! approval that extended the window in the meantime wins.

use chrono::{DateTime, Utc};

use entitle_types::{Account, AccountId};

use crate::error::LedgerError;
use crate::wallet::WalletStore;

/// Load an account and apply any pending subscription lapse first.
pub fn load_current<S: WalletStore + ?Sized>(
    store: &S,
    id: &AccountId,
    now: DateTime<Utc>,
) -> Result<Account, LedgerError> {
    let account = store
        .load_account(id)?
        .ok_or_else(|| LedgerError::not_found("account", id))?;

    let Some(end) = lapsed_end(&account, now) else {
        return Ok(account);
    };

    if store.lapse_subscription(id, end)? {
        tracing::debug!(
            account = %id,
            tier = account.tier.as_str(),
            ended = %end,
            "Subscription lapsed; model slots released"
        );
    } else {
        tracing::debug!(account = %id, "Subscription changed during sweep; re-reading");
    }

    store
        .load_account(id)?
        .ok_or_else(|| LedgerError::not_found("account", id))
}

fn lapsed_end(account: &Account, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !account.subscription_lapsed(now) {
        return None;
    }
    account.subscription.as_ref().map(|subscription| subscription.end)
}
