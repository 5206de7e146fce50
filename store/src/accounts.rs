//! Wallet and entitlement rows.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use entitle_types::{Account, AccountId, ContentId, ModelId, PackageId, Role, Subscription, Tier};

use crate::Store;
use crate::error::{StoreError, enum_column, is_unique_violation};
use crate::sqlite_util::{from_millis, to_millis};

const TABLE: &str = "accounts";

const ACCOUNT_COLUMNS: &str = "id, wallet_balance, tier, package_id, subscription_start, \
     subscription_end, referral_code, referred_by, commission_earnings, role, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateAccount {
    Created,
    AlreadyExists,
    /// An account or an influencer already holds the requested referral code.
    CodeTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { balance: i64 },
    /// Nothing was written.
    Insufficient { available: i64 },
    MissingAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotGrant {
    Granted,
    AlreadyHeld,
    LimitReached { limit: u32 },
    /// The paid window the caller saw is gone (lapsed or replaced). Nothing was written.
    SubscriptionChanged,
}

struct AccountRow {
    id: String,
    wallet_balance: i64,
    tier: String,
    package_id: Option<String>,
    subscription_start: Option<i64>,
    subscription_end: Option<i64>,
    referral_code: String,
    referred_by: Option<String>,
    commission_earnings: i64,
    role: String,
    created_at: i64,
}

impl AccountRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            wallet_balance: row.get(1)?,
            tier: row.get(2)?,
            package_id: row.get(3)?,
            subscription_start: row.get(4)?,
            subscription_end: row.get(5)?,
            referral_code: row.get(6)?,
            referred_by: row.get(7)?,
            commission_earnings: row.get(8)?,
            role: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl Store {
    /// Insert a fresh account unless one with this id exists.
    pub fn create_account(
        &self,
        id: &AccountId,
        role: Role,
        referral_code: &str,
        now: DateTime<Utc>,
    ) -> Result<CreateAccount, StoreError> {
        let tx = self.write_tx()?;
        let exists = tx
            .query_row("SELECT 1 FROM accounts WHERE id = ?1", [id.as_str()], |_| {
                Ok(())
            })
            .optional()?
            .is_some();
        if exists {
            return Ok(CreateAccount::AlreadyExists);
        }
        let influencer_code = tx
            .query_row(
                "SELECT 1 FROM influencers WHERE code = ?1",
                [referral_code],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if influencer_code {
            return Ok(CreateAccount::CodeTaken);
        }

        let inserted = tx.execute(
            "INSERT INTO accounts (id, referral_code, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), referral_code, role.as_str(), to_millis(now)],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(CreateAccount::CodeTaken),
            Err(err) => return Err(err.into()),
        }

        tx.commit()?;
        Ok(CreateAccount::Created)
    }

    pub fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
        self.read_account(&sql, id.as_str())
    }

    pub fn account_by_referral_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE referral_code = ?1");
        self.read_account(&sql, code)
    }

    /// All accounts, newest first.
    pub fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at DESC, id DESC");
        let tx = self.db.unchecked_transaction()?;
        let rows = {
            let mut stmt = tx.prepare(&sql)?;
            stmt.query_map([], AccountRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        rows.into_iter().map(|row| hydrate(&tx, row)).collect()
    }

    /// Row and unlock sets come from one read transaction, so a concurrent
    /// lapse or grant is seen entirely or not at all.
    fn read_account(&self, sql: &str, key: &str) -> Result<Option<Account>, StoreError> {
        let tx = self.db.unchecked_transaction()?;
        let row = tx.query_row(sql, [key], AccountRow::read).optional()?;
        row.map(|row| hydrate(&tx, row)).transpose()
    }

    /// Number of accounts whose `referred_by` points at `id`.
    pub fn referrals_count(&self, id: &AccountId) -> Result<u64, StoreError> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM accounts WHERE referred_by = ?1",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Atomically subtract `amount` if the balance covers it.
    pub fn debit(&self, id: &AccountId, amount: i64) -> Result<DebitOutcome, StoreError> {
        let balance: Option<i64> = self
            .db
            .query_row(
                "UPDATE accounts SET wallet_balance = wallet_balance - ?1
                 WHERE id = ?2 AND wallet_balance >= ?1
                 RETURNING wallet_balance",
                params![amount, id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(balance) = balance {
            return Ok(DebitOutcome::Debited { balance });
        }

        Ok(match self.wallet_balance(id)? {
            Some(available) => DebitOutcome::Insufficient { available },
            None => DebitOutcome::MissingAccount,
        })
    }

    /// Atomically add `amount`. Returns the new balance, or `None` for an unknown account.
    pub fn credit(&self, id: &AccountId, amount: i64) -> Result<Option<i64>, StoreError> {
        Ok(self
            .db
            .query_row(
                "UPDATE accounts SET wallet_balance = wallet_balance + ?1
                 WHERE id = ?2
                 RETURNING wallet_balance",
                params![amount, id.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn wallet_balance(&self, id: &AccountId) -> Result<Option<i64>, StoreError> {
        Ok(self
            .db
            .query_row(
                "SELECT wallet_balance FROM accounts WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Claim a model slot, counting held slots and inserting under one write lock
    /// so concurrent devices cannot overshoot `limit` (`None` = unlimited).
    ///
    /// The grant only lands while the account is still paid with a window ending
    /// at `subscription_end`; a lapse that ran after the caller read the account
    /// yields [`SlotGrant::SubscriptionChanged`].
    pub fn grant_model(
        &self,
        id: &AccountId,
        model_id: &ModelId,
        limit: Option<u32>,
        subscription_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SlotGrant, StoreError> {
        let tx = self.write_tx()?;
        let subscribed = tx
            .query_row(
                "SELECT 1 FROM accounts WHERE id = ?1 AND tier != 'free' AND subscription_end = ?2",
                params![id.as_str(), to_millis(subscription_end)],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !subscribed {
            return Ok(SlotGrant::SubscriptionChanged);
        }

        let held = tx
            .query_row(
                "SELECT 1 FROM model_unlocks WHERE account_id = ?1 AND model_id = ?2",
                params![id.as_str(), model_id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if held {
            return Ok(SlotGrant::AlreadyHeld);
        }

        if let Some(limit) = limit {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM model_unlocks WHERE account_id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )?;
            if count >= i64::from(limit) {
                return Ok(SlotGrant::LimitReached { limit });
            }
        }

        tx.execute(
            "INSERT INTO model_unlocks (account_id, model_id, granted_at) VALUES (?1, ?2, ?3)",
            params![id.as_str(), model_id.as_str(), to_millis(now)],
        )?;
        tx.commit()?;
        Ok(SlotGrant::Granted)
    }

    /// Idempotent insert. Returns `true` when the item was newly granted.
    pub fn grant_content(
        &self,
        id: &AccountId,
        content_id: &ContentId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changed = self.db.execute(
            "INSERT OR IGNORE INTO content_unlocks (account_id, content_id, granted_at)
             VALUES (?1, ?2, ?3)",
            params![id.as_str(), content_id.as_str(), to_millis(now)],
        )?;
        Ok(changed == 1)
    }

    /// Downgrade to Free and drop model slots, but only if the subscription
    /// still ends at `expected_end`. A concurrent approval that moved the end
    /// wins and this returns `false`.
    pub fn lapse_subscription(
        &self,
        id: &AccountId,
        expected_end: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let tx = self.write_tx()?;
        let changed = tx.execute(
            "UPDATE accounts
             SET tier = 'free', package_id = NULL, subscription_start = NULL, subscription_end = NULL
             WHERE id = ?1 AND tier != 'free' AND subscription_end = ?2",
            params![id.as_str(), to_millis(expected_end)],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute(
            "DELETE FROM model_unlocks WHERE account_id = ?1",
            [id.as_str()],
        )?;
        tx.commit()?;
        Ok(true)
    }
}

fn hydrate(db: &Connection, row: AccountRow) -> Result<Account, StoreError> {
    let tier: Tier = row.tier.parse().map_err(enum_column(TABLE))?;
    let role: Role = row.role.parse().map_err(enum_column(TABLE))?;
    let subscription = match (row.package_id, row.subscription_start, row.subscription_end) {
        (Some(package_id), Some(start), Some(end)) => Some(Subscription {
            package_id: PackageId::new(package_id),
            start: from_millis(TABLE, start)?,
            end: from_millis(TABLE, end)?,
        }),
        (None, None, None) => None,
        _ => {
            return Err(StoreError::corrupt(
                TABLE,
                format!("account {} has a partial subscription", row.id),
            ));
        }
    };

    let id = AccountId::new(row.id);
    let unlocked_model_ids = unlock_set(
        db,
        "SELECT model_id FROM model_unlocks WHERE account_id = ?1",
        &id,
    )?;
    let unlocked_content_ids = unlock_set(
        db,
        "SELECT content_id FROM content_unlocks WHERE account_id = ?1",
        &id,
    )?;

    Ok(Account {
        wallet_balance: row.wallet_balance,
        tier,
        subscription,
        unlocked_model_ids,
        unlocked_content_ids,
        referral_code: row.referral_code,
        referred_by: row.referred_by.map(AccountId::new),
        commission_earnings: row.commission_earnings,
        role,
        created_at: from_millis(TABLE, row.created_at)?,
        id,
    })
}

fn unlock_set<T: From<String> + Ord>(
    db: &Connection,
    sql: &str,
    id: &AccountId,
) -> Result<BTreeSet<T>, StoreError> {
    let mut stmt = db.prepare_cached(sql)?;
    let ids = stmt
        .query_map([id.as_str()], |row| row.get::<_, String>(0))?
        .map(|value| value.map(T::from))
        .collect::<rusqlite::Result<BTreeSet<T>>>()?;
    Ok(ids)
}
