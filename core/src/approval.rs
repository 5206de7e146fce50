//! Approval Engine.
//!
//! Approving a claim is a single store transaction whose first write is the
//! Pending → Approved compare-and-swap. Everything the claim grants (credits,
//! subscription window, commission) is computed up front and committed behind
//! that swap, so a retried or racing approval applies nothing twice.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use entitle_store::{ApprovalEffects, NewCommission, Resolution, Store};
use entitle_types::{
    Beneficiary, CommissionId, PurchaseId, PurchaseRequest, PurchaseStatus, Subscription, Tier,
};

use crate::catalog::{Catalog, Grant, subscription_length};
use crate::error::LedgerError;
use crate::referral::{self, ReferralPolicy};

/// What a successful approval granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub purchase: PurchaseRequest,
    pub credits: i64,
    pub subscription: Option<(Tier, Subscription)>,
    pub commission: Option<(Beneficiary, i64)>,
}

pub fn approve(
    store: &Store,
    catalog: &Catalog,
    policy: &ReferralPolicy,
    id: &PurchaseId,
    now: DateTime<Utc>,
) -> Result<Approval, LedgerError> {
    let mut purchase = store
        .purchase(id)?
        .ok_or_else(|| LedgerError::not_found("purchase", id))?;
    if purchase.status.is_terminal() {
        return Err(LedgerError::AlreadyResolved {
            status: purchase.status.as_str(),
        });
    }

    let grant = catalog.resolve(&purchase.kind).ok_or_else(|| {
        LedgerError::Consistency(format!(
            "{} {} is no longer in the catalog",
            purchase.kind.tag(),
            purchase.kind.target_id()
        ))
    })?;
    let subscription = match grant {
        Grant::Subscription(package) => Some((
            package.tier,
            Subscription {
                package_id: package.id.clone(),
                start: now,
                end: now + subscription_length(package),
            },
        )),
        Grant::Credits(_) => None,
    };

    let commission = match purchase.referral_code.as_deref() {
        Some(code) => attribute(store, policy, &purchase, code)?,
        None => None,
    };

    let effects = ApprovalEffects {
        purchase_id: purchase.id.clone(),
        account_id: purchase.account_id.clone(),
        credits: grant.credits(),
        subscription,
        commission,
        resolved_at: now,
    };

    match store.apply_approval(&effects)? {
        Resolution::Resolved => {}
        Resolution::AlreadyResolved(status) => {
            return Err(LedgerError::AlreadyResolved {
                status: status.as_str(),
            });
        }
        Resolution::Missing => return Err(LedgerError::not_found("purchase", id)),
    }

    purchase.status = PurchaseStatus::Approved;
    purchase.resolved_at = Some(now);
    tracing::info!(
        purchase = %purchase.id,
        account = %purchase.account_id,
        credits = effects.credits,
        tier = effects.subscription.as_ref().map(|(tier, _)| tier.as_str()),
        commission = effects.commission.as_ref().map(|c| c.amount),
        "Purchase approved"
    );

    Ok(Approval {
        purchase,
        credits: effects.credits,
        subscription: effects.subscription,
        commission: effects
            .commission
            .map(|commission| (commission.beneficiary, commission.amount)),
    })
}

/// Quote the commission for an approval. An unresolvable code skips
/// attribution instead of blocking the approval.
fn attribute(
    store: &Store,
    policy: &ReferralPolicy,
    purchase: &PurchaseRequest,
    code: &str,
) -> Result<Option<NewCommission>, LedgerError> {
    let Some(quote) = referral::quote(store, policy, code, &purchase.account_id)? else {
        tracing::warn!(
            purchase = %purchase.id,
            code,
            "Referral code no longer resolves; skipping commission"
        );
        return Ok(None);
    };
    Ok(Some(NewCommission {
        id: CommissionId::new(Uuid::new_v4().to_string()),
        amount: quote.amount_for(purchase.amount),
        beneficiary: quote.beneficiary,
    }))
}

pub fn reject(store: &Store, id: &PurchaseId, now: DateTime<Utc>) -> Result<(), LedgerError> {
    match store.reject_purchase(id, now)? {
        Resolution::Resolved => {
            tracing::info!(purchase = %id, "Purchase rejected");
            Ok(())
        }
        Resolution::AlreadyResolved(status) => Err(LedgerError::AlreadyResolved {
            status: status.as_str(),
        }),
        Resolution::Missing => Err(LedgerError::not_found("purchase", id)),
    }
}
