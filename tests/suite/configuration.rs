//! Ledgers built from a TOML configuration.

use chrono::TimeDelta;

use entitle_core::LedgerError;
use entitle_types::{Beneficiary, ModelId, PayoutMethod, Tier};

use crate::common::{Harness, credits, package, submit, user};

const CUSTOM: &str = r#"
[referral]
peer_commission_percent = 25
withdrawal_minimum = 200

[cache]
stats_ttl_secs = 0

[[catalog.packages]]
id = "starter"
tier = "tier1"
price = 100
duration_days = 7
credits = 10
model_limit = 1

[[catalog.packages]]
id = "gold"
tier = "vip"
price = 1500
duration_days = 90
credits = 2000
model_limit = "unlimited"

[[catalog.credit_packs]]
id = "mini"
credits = 50
price = 60
"#;

#[test]
fn configured_catalog_drives_grants() {
    let harness = Harness::with_config(CUSTOM);
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");

    let request = submit(&ledger, &buyer, package("starter"), 100, None);
    let approval = ledger.approve_purchase(&request.id).unwrap();
    let (tier, window) = approval.subscription.unwrap();
    assert_eq!(tier, Tier::Tier1);
    assert_eq!(window.end - window.start, TimeDelta::days(7));
    assert_eq!(approval.credits, 10);

    ledger.unlock_model(&buyer, &ModelId::new("m1")).unwrap();
    assert!(matches!(
        ledger.unlock_model(&buyer, &ModelId::new("m2")),
        Err(LedgerError::SlotLimitReached { limit: 1 })
    ));

    let err = ledger
        .submit_purchase(entitle_types::NewPurchase {
            account_id: buyer,
            kind: credits("credits_300"),
            amount: 250,
            transaction_reference: "TRX-OLD".to_string(),
            payer_number: "01700000000".to_string(),
            referral_code: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn configured_referral_policy_applies() {
    let harness = Harness::with_config(CUSTOM);
    let ledger = harness.ledger();
    assert_eq!(ledger.policy().peer_commission_percent, 25);

    let referrer = user(&ledger, "referrer");
    let buyer = user(&ledger, "buyer");
    let code = ledger.account_summary(&referrer).unwrap().account.referral_code;
    let request = submit(&ledger, &buyer, credits("mini"), 800, Some(&code));
    let approval = ledger.approve_purchase(&request.id).unwrap();
    assert_eq!(
        approval.commission,
        Some((Beneficiary::Account(referrer.clone()), 200))
    );

    let withdrawal = ledger
        .request_withdrawal(
            Beneficiary::Account(referrer),
            Some(150),
            PayoutMethod::Bkash,
            "01800000000",
        )
        .unwrap();
    assert_eq!(withdrawal.amount, 150);
}

#[test]
fn zero_ttl_stats_always_reload() {
    let harness = Harness::with_config(CUSTOM);
    let writer = harness.ledger();
    let reader = harness.ledger();

    user(&writer, "a1");
    assert_eq!(reader.admin_stats().unwrap().total_accounts, 1);
    user(&writer, "a2");
    assert_eq!(reader.admin_stats().unwrap().total_accounts, 2);
}

#[test]
fn cached_stats_only_refresh_on_own_writes_or_expiry() {
    let harness = Harness::new();
    let writer = harness.ledger();
    let reader = harness.ledger();

    user(&writer, "a1");
    assert_eq!(reader.admin_stats().unwrap().total_accounts, 1);
    user(&writer, "a2");
    assert_eq!(reader.admin_stats().unwrap().total_accounts, 1);

    harness.advance(TimeDelta::minutes(10));
    assert_eq!(reader.admin_stats().unwrap().total_accounts, 2);
}
