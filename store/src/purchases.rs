//! Payment claims and their one-shot resolution.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, Transaction, params};

use entitle_types::{
    AccountId, Beneficiary, CommissionId, CommissionRecord, PurchaseId, PurchaseKind,
    PurchaseRequest, PurchaseStatus, Subscription, Tier,
};

use crate::Store;
use crate::error::{StoreError, enum_column};
use crate::sqlite_util::{from_millis, from_optional_millis, to_millis};

const TABLE: &str = "purchase_requests";

const PURCHASE_COLUMNS: &str = "id, account_id, kind, target_id, amount, transaction_reference, \
     payer_number, referral_code, status, submitted_at, resolved_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPurchase {
    Inserted,
    /// The transaction reference already backs a pending or approved claim.
    DuplicateReference,
}

/// Result of a Pending → terminal transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// This caller won the transition and its effects were committed.
    Resolved,
    /// Someone else resolved the request first; nothing was written.
    AlreadyResolved(PurchaseStatus),
    Missing,
}

/// Keyset position for most-recent-first paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub submitted_at: DateTime<Utc>,
    pub id: PurchaseId,
}

impl From<&PurchaseRequest> for PageCursor {
    fn from(request: &PurchaseRequest) -> Self {
        Self {
            submitted_at: request.submitted_at,
            id: request.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommission {
    pub id: CommissionId,
    pub beneficiary: Beneficiary,
    pub amount: i64,
}

/// Everything an approval writes, applied in one transaction behind the
/// status compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEffects {
    pub purchase_id: PurchaseId,
    pub account_id: AccountId,
    pub credits: i64,
    pub subscription: Option<(Tier, Subscription)>,
    pub commission: Option<NewCommission>,
    pub resolved_at: DateTime<Utc>,
}

fn read_purchase(row: &Row<'_>) -> rusqlite::Result<PurchaseRow> {
    Ok(PurchaseRow {
        id: row.get(0)?,
        account_id: row.get(1)?,
        kind: row.get(2)?,
        target_id: row.get(3)?,
        amount: row.get(4)?,
        transaction_reference: row.get(5)?,
        payer_number: row.get(6)?,
        referral_code: row.get(7)?,
        status: row.get(8)?,
        submitted_at: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}

struct PurchaseRow {
    id: String,
    account_id: String,
    kind: String,
    target_id: String,
    amount: i64,
    transaction_reference: String,
    payer_number: String,
    referral_code: Option<String>,
    status: String,
    submitted_at: i64,
    resolved_at: Option<i64>,
}

impl PurchaseRow {
    fn into_request(self) -> Result<PurchaseRequest, StoreError> {
        Ok(PurchaseRequest {
            id: PurchaseId::new(self.id),
            account_id: AccountId::new(self.account_id),
            kind: PurchaseKind::from_parts(&self.kind, &self.target_id)
                .map_err(enum_column(TABLE))?,
            amount: self.amount,
            transaction_reference: self.transaction_reference,
            payer_number: self.payer_number,
            referral_code: self.referral_code,
            status: self.status.parse().map_err(enum_column(TABLE))?,
            submitted_at: from_millis(TABLE, self.submitted_at)?,
            resolved_at: from_optional_millis(TABLE, self.resolved_at)?,
        })
    }
}

impl Store {
    pub fn insert_purchase(&self, request: &PurchaseRequest) -> Result<InsertPurchase, StoreError> {
        let tx = self.write_tx()?;
        let reused = tx
            .query_row(
                "SELECT 1 FROM purchase_requests
                 WHERE transaction_reference = ?1 AND status != 'rejected'",
                [request.transaction_reference.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if reused {
            return Ok(InsertPurchase::DuplicateReference);
        }

        tx.execute(
            "INSERT INTO purchase_requests (id, account_id, kind, target_id, amount,
                 transaction_reference, payer_number, referral_code, status, submitted_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                request.id.as_str(),
                request.account_id.as_str(),
                request.kind.tag(),
                request.kind.target_id(),
                request.amount,
                &request.transaction_reference,
                &request.payer_number,
                request.referral_code.as_deref(),
                request.status.as_str(),
                to_millis(request.submitted_at),
                request.resolved_at.map(to_millis),
            ],
        )?;
        tx.commit()?;
        Ok(InsertPurchase::Inserted)
    }

    pub fn purchase(&self, id: &PurchaseId) -> Result<Option<PurchaseRequest>, StoreError> {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchase_requests WHERE id = ?1");
        self.db
            .query_row(&sql, [id.as_str()], read_purchase)
            .optional()?
            .map(PurchaseRow::into_request)
            .transpose()
    }

    /// One page of requests ordered most-recent-first, strictly after `cursor`.
    pub fn purchases_page(
        &self,
        status: Option<PurchaseStatus>,
        cursor: Option<&PageCursor>,
        limit: u32,
    ) -> Result<Vec<PurchaseRequest>, StoreError> {
        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchase_requests
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR submitted_at < ?2 OR (submitted_at = ?2 AND id < ?3))
             ORDER BY submitted_at DESC, id DESC
             LIMIT ?4"
        );
        let mut stmt = self.db.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    status.map(PurchaseStatus::as_str),
                    cursor.map(|c| to_millis(c.submitted_at)),
                    cursor.map(|c| c.id.as_str()),
                    i64::from(limit),
                ],
                read_purchase,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(PurchaseRow::into_request).collect()
    }

    /// Pending → Approved plus every financial effect, or nothing at all.
    pub fn apply_approval(&self, effects: &ApprovalEffects) -> Result<Resolution, StoreError> {
        let tx = self.write_tx()?;
        let won = tx.execute(
            "UPDATE purchase_requests SET status = 'approved', resolved_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![to_millis(effects.resolved_at), effects.purchase_id.as_str()],
        )?;
        if won == 0 {
            return lost_transition(&tx, &effects.purchase_id);
        }

        let account = effects.account_id.as_str();
        let updated = match &effects.subscription {
            Some((tier, subscription)) => tx.execute(
                "UPDATE accounts
                 SET wallet_balance = wallet_balance + ?1, tier = ?2, package_id = ?3,
                     subscription_start = ?4, subscription_end = ?5
                 WHERE id = ?6",
                params![
                    effects.credits,
                    tier.as_str(),
                    subscription.package_id.as_str(),
                    to_millis(subscription.start),
                    to_millis(subscription.end),
                    account,
                ],
            )?,
            None => tx.execute(
                "UPDATE accounts SET wallet_balance = wallet_balance + ?1 WHERE id = ?2",
                params![effects.credits, account],
            )?,
        };
        if updated == 0 {
            return Err(StoreError::corrupt(
                TABLE,
                format!(
                    "purchase {} references missing account {account}",
                    effects.purchase_id
                ),
            ));
        }

        if let Some(commission) = &effects.commission {
            record_commission(&tx, effects, commission)?;
        }

        tx.commit()?;
        Ok(Resolution::Resolved)
    }

    /// Pending → Rejected. No financial effect.
    pub fn reject_purchase(
        &self,
        id: &PurchaseId,
        now: DateTime<Utc>,
    ) -> Result<Resolution, StoreError> {
        let tx = self.write_tx()?;
        let won = tx.execute(
            "UPDATE purchase_requests SET status = 'rejected', resolved_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![to_millis(now), id.as_str()],
        )?;
        if won == 0 {
            return lost_transition(&tx, id);
        }
        tx.commit()?;
        Ok(Resolution::Resolved)
    }

    pub fn commission_for_purchase(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<CommissionRecord>, StoreError> {
        let row = self
            .db
            .query_row(
                "SELECT id, purchase_id, beneficiary_kind, beneficiary_id, amount, created_at
                 FROM commissions WHERE purchase_id = ?1",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, purchase_id, kind, beneficiary_id, amount, created_at)| {
            Ok(CommissionRecord {
                id: CommissionId::new(id),
                purchase_id: PurchaseId::new(purchase_id),
                beneficiary: Beneficiary::from_parts(&kind, &beneficiary_id)
                    .map_err(enum_column("commissions"))?,
                amount,
                created_at: from_millis("commissions", created_at)?,
            })
        })
        .transpose()
    }
}

/// The status CAS matched nothing: report why without writing.
fn lost_transition(tx: &Transaction<'_>, id: &PurchaseId) -> Result<Resolution, StoreError> {
    let status: Option<String> = tx
        .query_row(
            "SELECT status FROM purchase_requests WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    match status {
        Some(status) => Ok(Resolution::AlreadyResolved(
            status.parse().map_err(enum_column(TABLE))?,
        )),
        None => Ok(Resolution::Missing),
    }
}

/// Insert the commission row; only the insert that creates the row credits
/// the beneficiary.
fn record_commission(
    tx: &Transaction<'_>,
    effects: &ApprovalEffects,
    commission: &NewCommission,
) -> Result<(), StoreError> {
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO commissions
             (id, purchase_id, beneficiary_kind, beneficiary_id, amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            commission.id.as_str(),
            effects.purchase_id.as_str(),
            commission.beneficiary.tag(),
            commission.beneficiary.id(),
            commission.amount,
            to_millis(effects.resolved_at),
        ],
    )?;
    if inserted == 0 {
        return Ok(());
    }

    let credited = match &commission.beneficiary {
        Beneficiary::Influencer(id) => tx.execute(
            "UPDATE influencers SET cumulative_earnings = cumulative_earnings + ?1 WHERE id = ?2",
            params![commission.amount, id.as_str()],
        )?,
        Beneficiary::Account(id) => {
            let credited = tx.execute(
                "UPDATE accounts SET commission_earnings = commission_earnings + ?1 WHERE id = ?2",
                params![commission.amount, id.as_str()],
            )?;
            tx.execute(
                "UPDATE accounts SET referred_by = ?1 WHERE id = ?2 AND referred_by IS NULL",
                params![id.as_str(), effects.account_id.as_str()],
            )?;
            credited
        }
    };
    if credited == 0 {
        return Err(StoreError::corrupt(
            "commissions",
            format!("beneficiary {} does not exist", commission.beneficiary),
        ));
    }
    Ok(())
}
