//! SQLite persistence for the entitlement ledger.
//!
//! One table per entity, keyed by id. Every financial mutation is either a
//! single atomic statement (`SET x = x + ?` guarded by a `WHERE` clause) or an
//! IMMEDIATE transaction whose first write is a compare-and-swap on a status
//! column. Callers never read-modify-write balances.
//!
//! A [`Store`] owns one connection. Concurrent sessions open their own
//! `Store` on the same file; SQLite's busy timeout bounds how long any call
//! waits for another writer before reporting [`StoreError::Busy`].
//!
//! ```text
//! accounts ──< model_unlocks
//!          ──< content_unlocks
//!          ──< purchase_requests ──? commissions
//! influencers
//! withdrawals
//! ```

mod accounts;
mod error;
mod purchases;
mod referrals;
mod sqlite_util;
mod stats;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub use accounts::{CreateAccount, DebitOutcome, SlotGrant};
pub use error::StoreError;
pub use purchases::{ApprovalEffects, InsertPurchase, NewCommission, PageCursor, Resolution};
pub use referrals::{InsertInfluencer, PayoutOutcome, WithdrawalResolution};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent ledger state.
pub struct Store {
    db: Connection,
}

impl Store {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            wallet_balance INTEGER NOT NULL DEFAULT 0 CHECK (wallet_balance >= 0),
            tier TEXT NOT NULL DEFAULT 'free',
            package_id TEXT,
            subscription_start INTEGER,
            subscription_end INTEGER,
            referral_code TEXT NOT NULL UNIQUE,
            referred_by TEXT,
            commission_earnings INTEGER NOT NULL DEFAULT 0 CHECK (commission_earnings >= 0),
            role TEXT NOT NULL DEFAULT 'user',
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS model_unlocks (
            account_id TEXT NOT NULL,
            model_id TEXT NOT NULL,
            granted_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, model_id),
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        );

        CREATE TABLE IF NOT EXISTS content_unlocks (
            account_id TEXT NOT NULL,
            content_id TEXT NOT NULL,
            granted_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, content_id),
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        );

        CREATE TABLE IF NOT EXISTS purchase_requests (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            target_id TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            transaction_reference TEXT NOT NULL,
            payer_number TEXT NOT NULL,
            referral_code TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            submitted_at INTEGER NOT NULL,
            resolved_at INTEGER,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        );

        -- A claimed transfer may back at most one live (non-rejected) request
        CREATE UNIQUE INDEX IF NOT EXISTS idx_purchase_live_reference
        ON purchase_requests(transaction_reference) WHERE status != 'rejected';

        CREATE INDEX IF NOT EXISTS idx_purchase_submitted
        ON purchase_requests(submitted_at, id);

        CREATE INDEX IF NOT EXISTS idx_purchase_status_submitted
        ON purchase_requests(status, submitted_at, id);

        CREATE TABLE IF NOT EXISTS commissions (
            id TEXT PRIMARY KEY,
            purchase_id TEXT NOT NULL UNIQUE,
            beneficiary_kind TEXT NOT NULL,
            beneficiary_id TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount >= 0),
            created_at INTEGER NOT NULL,
            FOREIGN KEY (purchase_id) REFERENCES purchase_requests(id)
        );

        CREATE TABLE IF NOT EXISTS influencers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            commission_rate_percent INTEGER NOT NULL
                CHECK (commission_rate_percent BETWEEN 0 AND 100),
            active INTEGER NOT NULL DEFAULT 1,
            cumulative_earnings INTEGER NOT NULL DEFAULT 0,
            cumulative_paid INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            CHECK (cumulative_paid <= cumulative_earnings)
        );

        CREATE TABLE IF NOT EXISTS withdrawals (
            id TEXT PRIMARY KEY,
            beneficiary_kind TEXT NOT NULL,
            beneficiary_id TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            payout_method TEXT NOT NULL,
            payout_number TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            requested_at INTEGER NOT NULL,
            resolved_at INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_withdrawals_status
        ON withdrawals(status, requested_at);
    ";

    /// Open or create the ledger database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sqlite_util::open_secure_db(path)?;
        tracing::debug!(path = %path.display(), "Opened ledger database");
        Self::initialize(db, busy_timeout)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Connection::open_in_memory()?;
        Self::initialize(db, DEFAULT_BUSY_TIMEOUT)
    }

    fn initialize(db: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        db.busy_timeout(busy_timeout)?;
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )?;
        db.execute_batch(Self::SCHEMA)?;
        Ok(Self { db })
    }

    /// Begin a write transaction that takes the database write lock up front,
    /// so conflicting writers wait on the busy timeout instead of failing
    /// mid-transaction.
    fn write_tx(&self) -> Result<Transaction<'_>, StoreError> {
        Ok(Transaction::new_unchecked(
            &self.db,
            TransactionBehavior::Immediate,
        )?)
    }
}
