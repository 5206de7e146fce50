//! Influencers and commission payouts.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, Transaction, params};

use entitle_types::{
    Beneficiary, Influencer, InfluencerId, WithdrawalId, WithdrawalRequest, WithdrawalStatus,
};

use crate::Store;
use crate::error::{StoreError, enum_column, is_unique_violation};
use crate::sqlite_util::{from_millis, from_optional_millis, to_millis};

const INFLUENCER_COLUMNS: &str =
    "id, name, code, commission_rate_percent, active, cumulative_earnings, cumulative_paid";

const WITHDRAWAL_COLUMNS: &str = "id, beneficiary_kind, beneficiary_id, amount, payout_method, \
     payout_number, status, requested_at, resolved_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertInfluencer {
    Inserted,
    CodeTaken,
    /// The code is an account's own referral code.
    AccountCode,
}

/// Result of approving a payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutOutcome {
    Paid,
    AlreadyResolved(WithdrawalStatus),
    Missing,
    /// Recorded earnings no longer cover the amount. Nothing was written.
    InsufficientEarnings { available: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalResolution {
    Rejected,
    AlreadyResolved(WithdrawalStatus),
    Missing,
}

fn read_influencer(row: &Row<'_>) -> rusqlite::Result<Influencer> {
    let rate: i64 = row.get(3)?;
    Ok(Influencer {
        id: InfluencerId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        code: row.get(2)?,
        // CHECK constraint keeps the column within 0..=100
        commission_rate_percent: u32::try_from(rate).unwrap_or_default(),
        active: row.get(4)?,
        cumulative_earnings: row.get(5)?,
        cumulative_paid: row.get(6)?,
    })
}

struct WithdrawalRow {
    id: String,
    beneficiary_kind: String,
    beneficiary_id: String,
    amount: i64,
    payout_method: String,
    payout_number: String,
    status: String,
    requested_at: i64,
    resolved_at: Option<i64>,
}

impl WithdrawalRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            beneficiary_kind: row.get(1)?,
            beneficiary_id: row.get(2)?,
            amount: row.get(3)?,
            payout_method: row.get(4)?,
            payout_number: row.get(5)?,
            status: row.get(6)?,
            requested_at: row.get(7)?,
            resolved_at: row.get(8)?,
        })
    }

    fn into_request(self) -> Result<WithdrawalRequest, StoreError> {
        const TABLE: &str = "withdrawals";
        Ok(WithdrawalRequest {
            id: WithdrawalId::new(self.id),
            beneficiary: Beneficiary::from_parts(&self.beneficiary_kind, &self.beneficiary_id)
                .map_err(enum_column(TABLE))?,
            amount: self.amount,
            payout_method: self.payout_method.parse().map_err(enum_column(TABLE))?,
            payout_number: self.payout_number,
            status: self.status.parse().map_err(enum_column(TABLE))?,
            requested_at: from_millis(TABLE, self.requested_at)?,
            resolved_at: from_optional_millis(TABLE, self.resolved_at)?,
        })
    }
}

impl Store {
    pub fn insert_influencer(
        &self,
        influencer: &Influencer,
        now: DateTime<Utc>,
    ) -> Result<InsertInfluencer, StoreError> {
        let tx = self.write_tx()?;
        let account_code = tx
            .query_row(
                "SELECT 1 FROM accounts WHERE referral_code = ?1",
                [&influencer.code],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if account_code {
            return Ok(InsertInfluencer::AccountCode);
        }

        let inserted = tx.execute(
            "INSERT INTO influencers (id, name, code, commission_rate_percent, active,
                 cumulative_earnings, cumulative_paid, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                influencer.id.as_str(),
                &influencer.name,
                &influencer.code,
                influencer.commission_rate_percent,
                influencer.active,
                influencer.cumulative_earnings,
                influencer.cumulative_paid,
                to_millis(now),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(InsertInfluencer::CodeTaken),
            Err(err) => return Err(err.into()),
        }
        tx.commit()?;
        Ok(InsertInfluencer::Inserted)
    }

    pub fn influencer(&self, id: &InfluencerId) -> Result<Option<Influencer>, StoreError> {
        let sql = format!("SELECT {INFLUENCER_COLUMNS} FROM influencers WHERE id = ?1");
        Ok(self
            .db
            .query_row(&sql, [id.as_str()], read_influencer)
            .optional()?)
    }

    /// Lookup by code regardless of the active flag.
    pub fn influencer_by_code(&self, code: &str) -> Result<Option<Influencer>, StoreError> {
        let sql = format!("SELECT {INFLUENCER_COLUMNS} FROM influencers WHERE code = ?1");
        Ok(self
            .db
            .query_row(&sql, [code], read_influencer)
            .optional()?)
    }

    pub fn list_influencers(&self) -> Result<Vec<Influencer>, StoreError> {
        let sql = format!("SELECT {INFLUENCER_COLUMNS} FROM influencers ORDER BY created_at, id");
        let mut stmt = self.db.prepare(&sql)?;
        let influencers = stmt
            .query_map([], read_influencer)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(influencers)
    }

    /// Returns `false` if no such influencer exists.
    pub fn set_influencer_active(&self, id: &InfluencerId, active: bool) -> Result<bool, StoreError> {
        let changed = self.db.execute(
            "UPDATE influencers SET active = ?1 WHERE id = ?2",
            params![active, id.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Earned but unpaid commission for a beneficiary, `None` if unknown.
    pub fn available_earnings(&self, who: &Beneficiary) -> Result<Option<i64>, StoreError> {
        available_in(&self.db, who)
    }

    pub fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), StoreError> {
        self.db.execute(
            "INSERT INTO withdrawals (id, beneficiary_kind, beneficiary_id, amount, payout_method,
                 payout_number, status, requested_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                request.id.as_str(),
                request.beneficiary.tag(),
                request.beneficiary.id(),
                request.amount,
                request.payout_method.as_str(),
                &request.payout_number,
                request.status.as_str(),
                to_millis(request.requested_at),
                request.resolved_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    pub fn withdrawal(&self, id: &WithdrawalId) -> Result<Option<WithdrawalRequest>, StoreError> {
        let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1");
        self.db
            .query_row(&sql, [id.as_str()], WithdrawalRow::read)
            .optional()?
            .map(WithdrawalRow::into_request)
            .transpose()
    }

    /// Withdrawals, most recent first, optionally filtered by status.
    pub fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let sql = format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY requested_at DESC, id DESC"
        );
        let mut stmt = self.db.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([status.map(WithdrawalStatus::as_str)], WithdrawalRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(WithdrawalRow::into_request).collect()
    }

    /// Pending → Paid and the matching earnings decrement, in one transaction.
    pub fn pay_withdrawal(
        &self,
        id: &WithdrawalId,
        now: DateTime<Utc>,
    ) -> Result<PayoutOutcome, StoreError> {
        let tx = self.write_tx()?;
        let Some((beneficiary, amount, status)) = withdrawal_state(&tx, id)? else {
            return Ok(PayoutOutcome::Missing);
        };
        if status != WithdrawalStatus::Pending {
            return Ok(PayoutOutcome::AlreadyResolved(status));
        }

        let won = tx.execute(
            "UPDATE withdrawals SET status = 'paid', resolved_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![to_millis(now), id.as_str()],
        )?;
        if won == 0 {
            return Err(StoreError::corrupt(
                "withdrawals",
                format!("withdrawal {id} changed under the write lock"),
            ));
        }

        let debited = match &beneficiary {
            Beneficiary::Account(account) => tx.execute(
                "UPDATE accounts SET commission_earnings = commission_earnings - ?1
                 WHERE id = ?2 AND commission_earnings >= ?1",
                params![amount, account.as_str()],
            )?,
            Beneficiary::Influencer(influencer) => tx.execute(
                "UPDATE influencers SET cumulative_paid = cumulative_paid + ?1
                 WHERE id = ?2 AND cumulative_earnings - cumulative_paid >= ?1",
                params![amount, influencer.as_str()],
            )?,
        };
        if debited == 0 {
            let available = available_in(&tx, &beneficiary)?.unwrap_or_default();
            // Dropping the transaction rolls back the status change.
            return Ok(PayoutOutcome::InsufficientEarnings { available });
        }

        tx.commit()?;
        Ok(PayoutOutcome::Paid)
    }

    pub fn reject_withdrawal(
        &self,
        id: &WithdrawalId,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalResolution, StoreError> {
        let tx = self.write_tx()?;
        let won = tx.execute(
            "UPDATE withdrawals SET status = 'rejected', resolved_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![to_millis(now), id.as_str()],
        )?;
        if won == 1 {
            tx.commit()?;
            return Ok(WithdrawalResolution::Rejected);
        }
        Ok(match withdrawal_state(&tx, id)? {
            Some((_, _, status)) => WithdrawalResolution::AlreadyResolved(status),
            None => WithdrawalResolution::Missing,
        })
    }
}

fn withdrawal_state(
    tx: &Transaction<'_>,
    id: &WithdrawalId,
) -> Result<Option<(Beneficiary, i64, WithdrawalStatus)>, StoreError> {
    let row = tx
        .query_row(
            "SELECT beneficiary_kind, beneficiary_id, amount, status FROM withdrawals WHERE id = ?1",
            [id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((kind, beneficiary_id, amount, status)) = row else {
        return Ok(None);
    };
    let beneficiary =
        Beneficiary::from_parts(&kind, &beneficiary_id).map_err(enum_column("withdrawals"))?;
    let status = status.parse().map_err(enum_column("withdrawals"))?;
    Ok(Some((beneficiary, amount, status)))
}

fn available_in(db: &rusqlite::Connection, who: &Beneficiary) -> Result<Option<i64>, StoreError> {
    let (sql, id) = match who {
        Beneficiary::Account(id) => (
            "SELECT commission_earnings FROM accounts WHERE id = ?1",
            id.as_str(),
        ),
        Beneficiary::Influencer(id) => (
            "SELECT cumulative_earnings - cumulative_paid FROM influencers WHERE id = ?1",
            id.as_str(),
        ),
    };
    Ok(db.query_row(sql, [id], |row| row.get(0)).optional()?)
}
