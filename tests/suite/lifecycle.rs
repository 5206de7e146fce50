//! Subscription expiry, VIP access, wallet bounds, and admin read models.

use chrono::TimeDelta;

use entitle_core::{LedgerError, Unlock};
use entitle_types::{ContentId, ModelId, PurchaseStatus, Role, Tier};

use crate::common::{Harness, buy, credits, package, submit, user};

#[test]
fn lapsed_subscription_downgrades_on_next_access() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    buy(&ledger, &buyer, package("package2"), 599);
    ledger.unlock_model(&buyer, &ModelId::new("m1")).unwrap();
    ledger
        .unlock_content(&buyer, &ContentId::new("c1"), 25)
        .unwrap();

    harness.advance(TimeDelta::days(30));
    let account = ledger.account_summary(&buyer).unwrap().account;
    assert_eq!(account.tier, Tier::Tier2, "the window end itself is still covered");

    harness.advance(TimeDelta::seconds(1));
    let account = ledger.account_summary(&buyer).unwrap().account;
    assert_eq!(account.tier, Tier::Free);
    assert!(account.subscription.is_none());
    assert!(account.unlocked_model_ids.is_empty());
    assert!(account.has_content(&ContentId::new("c1")));
    assert_eq!(account.wallet_balance, 275);
}

#[test]
fn another_session_observes_the_downgrade() {
    let harness = Harness::new();
    let admin = harness.ledger();
    let device = harness.ledger();
    let buyer = user(&admin, "buyer");
    buy(&admin, &buyer, package("package1"), 299);
    device.unlock_model(&buyer, &ModelId::new("m1")).unwrap();

    harness.advance(TimeDelta::days(31));
    assert!(!device.can_access_model(&buyer, &ModelId::new("m1")).unwrap());

    let listed = admin.list_accounts().unwrap();
    let account = listed.iter().find(|account| account.id == buyer).unwrap();
    assert_eq!(account.tier, Tier::Free);
}

#[test]
fn renewal_after_lapse_starts_a_fresh_window() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    buy(&ledger, &buyer, package("package1"), 299);
    harness.advance(TimeDelta::days(40));

    let renewal = buy(&ledger, &buyer, package("package1"), 299);
    let account = ledger.account_summary(&buyer).unwrap().account;
    let subscription = account.subscription.unwrap();
    assert_eq!(account.tier, Tier::Tier1);
    assert_eq!(Some(subscription.start), renewal.resolved_at);
    assert_eq!(subscription.end, subscription.start + TimeDelta::days(30));
}

#[test]
fn vip_reaches_any_model_without_recording_slots() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    buy(&ledger, &buyer, package("package3"), 999);

    for model in ["m1", "m2", "m3", "m4", "anything-else"] {
        let model = ModelId::new(model);
        assert!(ledger.can_access_model(&buyer, &model).unwrap());
        assert_eq!(ledger.unlock_model(&buyer, &model).unwrap(), Unlock::AlreadyHeld);
    }
    let account = ledger.account_summary(&buyer).unwrap().account;
    assert!(account.unlocked_model_ids.is_empty());
    assert_eq!(account.wallet_balance, 1_000);
}

#[test]
fn wallet_never_goes_negative() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    ledger.credit(&buyer, 100).unwrap();

    assert_eq!(ledger.debit(&buyer, 60).unwrap(), 40);
    assert!(matches!(
        ledger.debit(&buyer, 41),
        Err(LedgerError::InsufficientBalance {
            required: 41,
            available: 40
        })
    ));
    assert!(matches!(
        ledger.debit(&buyer, 0),
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        ledger.credit(&buyer, -5),
        Err(LedgerError::Validation(_))
    ));
    assert_eq!(ledger.debit(&buyer, 40).unwrap(), 0);
    assert_eq!(
        ledger.account_summary(&buyer).unwrap().account.wallet_balance,
        0
    );
}

#[test]
fn rejected_claims_grant_nothing() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    let request = submit(&ledger, &buyer, package("package2"), 599, None);

    ledger.reject_purchase(&request.id).unwrap();
    assert!(matches!(
        ledger.approve_purchase(&request.id),
        Err(LedgerError::AlreadyResolved { status: "rejected" })
    ));

    let account = ledger.account_summary(&buyer).unwrap().account;
    assert_eq!(account.tier, Tier::Free);
    assert_eq!(account.wallet_balance, 0);
    assert_eq!(
        ledger.purchase(&request.id).unwrap().status,
        PurchaseStatus::Rejected
    );
}

#[test]
fn purchase_listing_filters_and_orders_newest_first() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    let mut submitted = Vec::new();
    for _ in 0..60 {
        harness.advance(TimeDelta::seconds(1));
        submitted.push(submit(&ledger, &buyer, credits("credits_100"), 100, None));
    }
    ledger.approve_purchase(&submitted[0].id).unwrap();

    let all: Vec<_> = ledger.purchases(None).collect::<Result<_, _>>().unwrap();
    assert_eq!(all.len(), 60);
    assert_eq!(all[0].id, submitted[59].id);
    assert_eq!(all[59].id, submitted[0].id);

    let pending = ledger
        .purchases(Some(PurchaseStatus::Pending))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(pending.len(), 59);
    assert!(pending.iter().all(|request| request.status == PurchaseStatus::Pending));

    let approved: Vec<_> = ledger
        .purchases(Some(PurchaseStatus::Approved))
        .map(|request| request.unwrap().id)
        .collect();
    assert_eq!(approved, vec![submitted[0].id.clone()]);
}

#[test]
fn admin_stats_track_revenue_and_commission() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    ledger
        .ensure_account(&entitle_types::AccountId::new("ops"), Role::Admin)
        .unwrap();
    ledger.create_influencer("Star", "STAR", 20).unwrap();

    let first = submit(&ledger, &buyer, credits("credits_1000"), 750, Some("STAR"));
    ledger.approve_purchase(&first.id).unwrap();
    let second = submit(&ledger, &buyer, credits("credits_300"), 250, None);
    submit(&ledger, &buyer, credits("credits_100"), 100, None);
    ledger.approve_purchase(&second.id).unwrap();

    let stats = ledger.admin_stats().unwrap();
    assert_eq!(stats.total_accounts, 2);
    assert_eq!(stats.pending_purchases, 1);
    assert_eq!(stats.total_revenue, 1_000);
    assert_eq!(stats.total_commission, 150);
    assert_eq!(stats.commission_paid, 0);
    assert_eq!(stats.commission_owed(), 150);
    assert_eq!(stats.net_income(), 850);
}
