//! Racing sessions on one database file.
//!
//! Each thread owns its own `Ledger` (and therefore its own connection), the
//! way separate operator consoles or user devices would.

use std::sync::{Arc, Barrier};
use std::thread;

use entitle_core::{Ledger, LedgerError, Unlock};
use entitle_types::ContentId;

use crate::common::{Harness, credits, submit, user};

/// Run `work` once per ledger, all released at the same instant.
fn race<T: Send + 'static>(
    ledgers: Vec<Ledger>,
    work: impl Fn(&Ledger) -> T + Send + Sync + 'static,
) -> Vec<T> {
    let barrier = Arc::new(Barrier::new(ledgers.len()));
    let work = Arc::new(work);
    let handles: Vec<_> = ledgers
        .into_iter()
        .map(|ledger| {
            let barrier = Arc::clone(&barrier);
            let work = Arc::clone(&work);
            thread::spawn(move || {
                barrier.wait();
                work(&ledger)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().expect("worker panicked"))
        .collect()
}

fn sessions(harness: &Harness, count: usize) -> Vec<Ledger> {
    (0..count).map(|_| harness.ledger()).collect()
}

#[test]
fn racing_operators_approve_a_claim_exactly_once() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    let star = ledger.create_influencer("Star", "STAR", 20).unwrap();
    let request = submit(&ledger, &buyer, credits("credits_300"), 500, Some("STAR"));

    let id = request.id.clone();
    let outcomes = race(sessions(&harness, 6), move |session| {
        session.approve_purchase(&id).map(|_| ())
    });

    let approved = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(approved, 1);
    for outcome in outcomes.iter().filter_map(|outcome| outcome.as_ref().err()) {
        assert!(
            matches!(outcome, LedgerError::AlreadyResolved { status: "approved" }),
            "unexpected error: {outcome}"
        );
    }

    assert_eq!(ledger.account_summary(&buyer).unwrap().account.wallet_balance, 300);
    let star = ledger
        .list_influencers()
        .unwrap()
        .into_iter()
        .find(|influencer| influencer.id == star.id)
        .unwrap();
    assert_eq!(star.cumulative_earnings, 100);
    assert_eq!(ledger.admin_stats().unwrap().total_commission, 100);
}

#[test]
fn concurrent_debits_never_overdraw() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    ledger.credit(&buyer, 100).unwrap();

    let account = buyer.clone();
    let outcomes = race(sessions(&harness, 8), move |session| {
        session.debit(&account, 20)
    });

    let succeeded = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(succeeded, 5);
    assert!(
        outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().err())
            .all(|err| matches!(err, LedgerError::InsufficientBalance { required: 20, .. }))
    );
    assert_eq!(ledger.account_summary(&buyer).unwrap().account.wallet_balance, 0);
}

#[test]
fn two_devices_buying_the_same_content_pay_once() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let buyer = user(&ledger, "buyer");
    ledger.credit(&buyer, 100).unwrap();

    let account = buyer.clone();
    let outcomes = race(sessions(&harness, 2), move |session| {
        session.unlock_content(&account, &ContentId::new("c1"), 30)
    });

    let granted = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(Unlock::Granted)))
        .count();
    assert_eq!(granted, 1);
    assert!(
        outcomes
            .iter()
            .all(|outcome| matches!(outcome, Ok(Unlock::Granted | Unlock::AlreadyHeld)))
    );

    let account = ledger.account_summary(&buyer).unwrap().account;
    assert_eq!(account.wallet_balance, 70);
    assert!(account.has_content(&ContentId::new("c1")));
}

#[test]
fn approvals_for_different_accounts_all_land() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let claims: Vec<_> = (0..4)
        .map(|n| {
            let account = user(&ledger, &format!("buyer-{n}"));
            submit(&ledger, &account, credits("credits_100"), 100, None)
        })
        .collect();

    let ids: Vec<_> = claims.iter().map(|claim| claim.id.clone()).collect();
    let next = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let outcomes = race(sessions(&harness, ids.len()), move |session| {
        let index = next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        session.approve_purchase(&ids[index]).map(|approval| approval.credits)
    });

    assert!(outcomes.iter().all(|outcome| matches!(outcome, Ok(100))));
    for claim in &claims {
        let balance = ledger
            .account_summary(&claim.account_id)
            .unwrap()
            .account
            .wallet_balance;
        assert_eq!(balance, 100);
    }
}
