//! Shared test utilities and fixtures
//!
//! Every harness owns a temporary ledger database file. Each call to
//! [`Harness::ledger`] opens an independent connection on that file, which is
//! how separate operator sessions or devices see the ledger.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

use entitle_config::EntitleConfig;
use entitle_core::{Clock, Ledger, ManualClock};
use entitle_store::Store;
use entitle_types::{
    AccountId, CreditPackId, NewPurchase, PackageId, PurchaseKind, PurchaseRequest, Role,
};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub struct Harness {
    _dir: TempDir,
    pub path: PathBuf,
    pub clock: Arc<ManualClock>,
    config: EntitleConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config("")
    }

    /// Harness whose ledgers read the given TOML configuration.
    pub fn with_config(toml: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");
        let config = EntitleConfig::from_toml_str(toml).expect("test config");
        Self {
            _dir: dir,
            path,
            clock: Arc::new(ManualClock::new(start())),
            config,
        }
    }

    /// A fresh session on the shared database file.
    pub fn ledger(&self) -> Ledger {
        let store = Store::open(&self.path, Duration::from_secs(10)).expect("open store");
        let clock: Arc<dyn Clock> = self.clock.clone();
        Ledger::with_store(store, &self.config, clock).expect("ledger")
    }

    pub fn advance(&self, delta: TimeDelta) {
        self.clock.advance(delta);
    }
}

pub fn user(ledger: &Ledger, id: &str) -> AccountId {
    let id = AccountId::new(id);
    ledger.ensure_account(&id, Role::User).expect("ensure account");
    id
}

pub fn package(id: &str) -> PurchaseKind {
    PurchaseKind::PackageSubscription {
        package_id: PackageId::new(id),
    }
}

pub fn credits(pack: &str) -> PurchaseKind {
    PurchaseKind::CreditTopUp {
        credit_pack_id: CreditPackId::new(pack),
    }
}

/// Submit a claim with a unique transaction reference.
pub fn submit(
    ledger: &Ledger,
    account: &AccountId,
    kind: PurchaseKind,
    amount: i64,
    referral_code: Option<&str>,
) -> PurchaseRequest {
    ledger
        .submit_purchase(NewPurchase {
            account_id: account.clone(),
            kind,
            amount,
            transaction_reference: next_reference(),
            payer_number: "01700000000".to_string(),
            referral_code: referral_code.map(ToString::to_string),
        })
        .expect("submit purchase")
}

fn next_reference() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!("TRX{:08}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Submit and approve in one step; returns the approved request.
pub fn buy(ledger: &Ledger, account: &AccountId, kind: PurchaseKind, amount: i64) -> PurchaseRequest {
    let request = submit(ledger, account, kind, amount, None);
    ledger
        .approve_purchase(&request.id)
        .expect("approve purchase")
        .purchase
}
