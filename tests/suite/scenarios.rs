//! End-to-end walkthroughs of the core purchase, unlock, and payout flows.

use entitle_core::{LedgerError, Unlock};
use entitle_types::{Beneficiary, ContentId, ModelId, PayoutMethod, Tier};

use crate::common::{Harness, buy, credits, package, submit, user};

#[test]
fn retried_top_up_approval_credits_once() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    let request = submit(&ledger, &buyer, credits("credits_300"), 250, None);

    ledger.approve_purchase(&request.id).unwrap();
    let retry = ledger.approve_purchase(&request.id).unwrap_err();
    assert!(matches!(retry, LedgerError::AlreadyResolved { .. }));

    let summary = ledger.account_summary(&buyer).unwrap();
    assert_eq!(summary.account.wallet_balance, 300);
}

#[test]
fn model_slots_require_and_follow_the_subscription() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");

    let err = ledger.unlock_model(&buyer, &ModelId::new("m1")).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::SubscriptionRequired {
            required_tier: Tier::Tier1
        }
    ));

    buy(&ledger, &buyer, package("package1"), 299);
    for model in ["m1", "m2", "m3"] {
        assert_eq!(
            ledger.unlock_model(&buyer, &ModelId::new(model)).unwrap(),
            Unlock::Granted
        );
    }
    let err = ledger.unlock_model(&buyer, &ModelId::new("m4")).unwrap_err();
    assert!(matches!(err, LedgerError::SlotLimitReached { limit: 3 }));
    assert!(ledger.can_access_model(&buyer, &ModelId::new("m2")).unwrap());
    assert!(!ledger.can_access_model(&buyer, &ModelId::new("m4")).unwrap());
}

#[test]
fn influencer_commission_survives_a_retried_approval() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    let star = ledger.create_influencer("Star", "STAR", 20).unwrap();
    let request = submit(&ledger, &buyer, credits("credits_1000"), 500, Some("STAR"));

    ledger.approve_purchase(&request.id).unwrap();
    assert!(ledger.approve_purchase(&request.id).is_err());

    let record = ledger.commission_for_purchase(&request.id).unwrap().unwrap();
    assert_eq!(record.amount, 100);
    assert_eq!(record.beneficiary, Beneficiary::Influencer(star.id.clone()));

    let star = ledger
        .list_influencers()
        .unwrap()
        .into_iter()
        .find(|influencer| influencer.id == star.id)
        .unwrap();
    assert_eq!(star.cumulative_earnings, 100);
}

#[test]
fn short_wallet_blocks_content_without_side_effects() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    ledger.credit(&buyer, 40).unwrap();

    let err = ledger
        .unlock_content(&buyer, &ContentId::new("c1"), 50)
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            required: 50,
            available: 40
        }
    ));

    let account = ledger.account_summary(&buyer).unwrap().account;
    assert_eq!(account.wallet_balance, 40);
    assert!(!account.has_content(&ContentId::new("c1")));
}

#[test]
fn paid_withdrawal_drains_earnings_below_the_minimum() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    let star = ledger.create_influencer("Star", "STAR", 20).unwrap();
    let request = submit(&ledger, &buyer, credits("credits_1000"), 5_000, Some("STAR"));
    ledger.approve_purchase(&request.id).unwrap();

    let who = Beneficiary::Influencer(star.id.clone());
    let withdrawal = ledger
        .request_withdrawal(who.clone(), Some(1_000), PayoutMethod::Bkash, "01800000000")
        .unwrap();
    ledger.approve_withdrawal(&withdrawal.id).unwrap();

    let star = ledger
        .list_influencers()
        .unwrap()
        .into_iter()
        .find(|influencer| influencer.id == star.id)
        .unwrap();
    assert_eq!(star.available_earnings(), 0);

    let err = ledger
        .request_withdrawal(who, None, PayoutMethod::Nagad, "01800000000")
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::BelowMinimumThreshold {
            minimum: 1_000,
            available: 0
        }
    ));
}

#[test]
fn peer_referral_earnings_can_be_withdrawn() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let referrer = user(&ledger, "referrer");
    let buyer = user(&ledger, "buyer");
    let code = ledger.account_summary(&referrer).unwrap().account.referral_code;

    let request = submit(&ledger, &buyer, credits("credits_1000"), 10_000, Some(&code));
    let approval = ledger.approve_purchase(&request.id).unwrap();
    assert_eq!(
        approval.commission,
        Some((Beneficiary::Account(referrer.clone()), 1_000))
    );

    let summary = ledger.account_summary(&referrer).unwrap();
    assert_eq!(summary.referrals_count, 1);
    assert_eq!(summary.account.commission_earnings, 1_000);

    let withdrawal = ledger
        .request_withdrawal(
            Beneficiary::Account(referrer.clone()),
            None,
            PayoutMethod::Nagad,
            "01900000000",
        )
        .unwrap();
    assert_eq!(withdrawal.amount, 1_000);
    ledger.approve_withdrawal(&withdrawal.id).unwrap();
    assert_eq!(
        ledger
            .account_summary(&referrer)
            .unwrap()
            .account
            .commission_earnings,
        0
    );
}

#[test]
fn own_referral_code_is_refused() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    let own = ledger.account_summary(&buyer).unwrap().account.referral_code;

    let err = ledger
        .submit_purchase(entitle_types::NewPurchase {
            account_id: buyer,
            kind: credits("credits_100"),
            amount: 100,
            transaction_reference: "TRX-SELF".to_string(),
            payer_number: "01700000000".to_string(),
            referral_code: Some(own),
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}
