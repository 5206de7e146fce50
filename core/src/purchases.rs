//! Purchase Request Ledger: append and query payment claims.
//!
//! Nothing here moves money. Claims are recorded as Pending and wait for the
//! approval engine.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use entitle_store::{InsertPurchase, PageCursor, Store};
use entitle_types::{NewPurchase, PurchaseId, PurchaseRequest, PurchaseStatus};

use crate::catalog::Catalog;
use crate::error::LedgerError;
use crate::referral::{self, ReferralPolicy};

const PAGE_SIZE: u32 = 50;

pub fn submit(
    store: &Store,
    catalog: &Catalog,
    policy: &ReferralPolicy,
    claim: NewPurchase,
    now: DateTime<Utc>,
) -> Result<PurchaseRequest, LedgerError> {
    if claim.amount <= 0 {
        return Err(LedgerError::validation(format!(
            "amount must be positive (got {})",
            claim.amount
        )));
    }
    if catalog.resolve(&claim.kind).is_none() {
        return Err(LedgerError::validation(format!(
            "{} {} is not in the catalog",
            claim.kind.tag(),
            claim.kind.target_id()
        )));
    }
    let transaction_reference = claim.transaction_reference.trim();
    if transaction_reference.is_empty() {
        return Err(LedgerError::validation(
            "transaction reference must not be blank",
        ));
    }
    let payer_number = claim.payer_number.trim();
    if payer_number.is_empty() {
        return Err(LedgerError::validation("payer number must not be blank"));
    }
    if store.account(&claim.account_id)?.is_none() {
        return Err(LedgerError::not_found("account", &claim.account_id));
    }

    let referral_code = claim
        .referral_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());
    if let Some(code) = referral_code
        && referral::quote(store, policy, code, &claim.account_id)?.is_none()
    {
        return Err(LedgerError::validation(format!(
            "referral code {code} does not belong to an active referrer"
        )));
    }

    let request = PurchaseRequest {
        id: PurchaseId::new(Uuid::new_v4().to_string()),
        account_id: claim.account_id.clone(),
        kind: claim.kind.clone(),
        amount: claim.amount,
        transaction_reference: transaction_reference.to_string(),
        payer_number: payer_number.to_string(),
        referral_code: referral_code.map(ToString::to_string),
        status: PurchaseStatus::Pending,
        submitted_at: now,
        resolved_at: None,
    };

    match store.insert_purchase(&request)? {
        InsertPurchase::Inserted => {
            tracing::info!(
                purchase = %request.id,
                account = %request.account_id,
                kind = request.kind.tag(),
                target = request.kind.target_id(),
                amount = request.amount,
                "Purchase submitted"
            );
            Ok(request)
        }
        InsertPurchase::DuplicateReference => Err(LedgerError::validation(format!(
            "transaction reference {transaction_reference} was already submitted"
        ))),
    }
}

/// Lazy, most-recent-first walk over purchase requests.
///
/// Rows are fetched a page at a time with a keyset cursor, so requests
/// submitted while iterating never shift or duplicate earlier results.
pub struct Purchases<'a> {
    store: &'a Store,
    status: Option<PurchaseStatus>,
    cursor: Option<PageCursor>,
    buffer: VecDeque<PurchaseRequest>,
    page_size: u32,
    exhausted: bool,
}

impl<'a> Purchases<'a> {
    pub(crate) fn new(store: &'a Store, status: Option<PurchaseStatus>) -> Self {
        Self {
            store,
            status,
            cursor: None,
            buffer: VecDeque::new(),
            page_size: PAGE_SIZE,
            exhausted: false,
        }
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn fill(&mut self) -> Result<(), LedgerError> {
        let page = self
            .store
            .purchases_page(self.status, self.cursor.as_ref(), self.page_size)?;
        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(PageCursor::from(last));
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for Purchases<'_> {
    type Item = Result<PurchaseRequest, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty()
            && !self.exhausted
            && let Err(err) = self.fill()
        {
            self.exhausted = true;
            return Some(Err(err));
        }
        self.buffer.pop_front().map(Ok)
    }
}
