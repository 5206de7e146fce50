//! Referral / Commission Ledger.
//!
//! A referral code resolves to an active influencer first, then to a peer
//! account's own referral code. Influencers earn their configured rate; peers
//! earn the configured peer rate. Earnings are paid out through withdrawal
//! requests that an operator approves.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use entitle_store::{InsertInfluencer, PayoutOutcome, Store, WithdrawalResolution};
use entitle_types::{
    AccountId, Beneficiary, Influencer, InfluencerId, PayoutMethod, WithdrawalId,
    WithdrawalRequest, WithdrawalStatus,
};

use crate::error::LedgerError;

/// Rates and thresholds taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralPolicy {
    pub peer_commission_percent: u32,
    pub withdrawal_minimum: i64,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        Self {
            peer_commission_percent: 10,
            withdrawal_minimum: 1_000,
        }
    }
}

/// Who a code pays and at what rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionQuote {
    pub beneficiary: Beneficiary,
    pub rate_percent: u32,
}

impl CommissionQuote {
    /// Floor of `amount × rate / 100`.
    #[must_use]
    pub fn amount_for(&self, amount: i64) -> i64 {
        amount.saturating_mul(i64::from(self.rate_percent)) / 100
    }
}

/// Resolve a referral code for a purchase by `purchaser`.
///
/// `None` when the code matches nothing that can earn: an unknown code, an
/// inactive influencer, or the purchaser's own code.
pub fn quote(
    store: &Store,
    policy: &ReferralPolicy,
    code: &str,
    purchaser: &AccountId,
) -> Result<Option<CommissionQuote>, LedgerError> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(None);
    }

    if let Some(influencer) = store.influencer_by_code(code)?
        && influencer.active
    {
        return Ok(Some(CommissionQuote {
            beneficiary: Beneficiary::Influencer(influencer.id),
            rate_percent: influencer.commission_rate_percent,
        }));
    }

    match store.account_by_referral_code(code)? {
        Some(peer) if peer.id != *purchaser => Ok(Some(CommissionQuote {
            beneficiary: Beneficiary::Account(peer.id),
            rate_percent: policy.peer_commission_percent,
        })),
        _ => Ok(None),
    }
}

pub fn create_influencer(
    store: &Store,
    name: &str,
    code: &str,
    commission_rate_percent: u32,
    now: DateTime<Utc>,
) -> Result<Influencer, LedgerError> {
    let name = name.trim();
    let code = code.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("influencer name must not be blank"));
    }
    if code.is_empty() || code.chars().any(char::is_whitespace) {
        return Err(LedgerError::validation(
            "influencer code must be a single non-blank word",
        ));
    }
    if commission_rate_percent > 100 {
        return Err(LedgerError::validation(format!(
            "commission rate must be between 0 and 100 (got {commission_rate_percent})"
        )));
    }
    let influencer = Influencer {
        id: InfluencerId::new(Uuid::new_v4().to_string()),
        name: name.to_string(),
        code: code.to_string(),
        commission_rate_percent,
        active: true,
        cumulative_earnings: 0,
        cumulative_paid: 0,
    };
    match store.insert_influencer(&influencer, now)? {
        InsertInfluencer::Inserted => {
            tracing::info!(influencer = %influencer.id, code, rate = commission_rate_percent, "Influencer created");
            Ok(influencer)
        }
        InsertInfluencer::CodeTaken => Err(LedgerError::validation(format!(
            "influencer code {code} is already taken"
        ))),
        InsertInfluencer::AccountCode => Err(LedgerError::validation(format!(
            "code {code} is already an account referral code"
        ))),
    }
}

pub fn set_influencer_active(
    store: &Store,
    id: &InfluencerId,
    active: bool,
) -> Result<(), LedgerError> {
    if !store.set_influencer_active(id, active)? {
        return Err(LedgerError::not_found("influencer", id));
    }
    tracing::info!(influencer = %id, active, "Influencer status changed");
    Ok(())
}

/// Open a payout request against earned, unpaid commission.
///
/// `amount` defaults to everything currently available.
pub fn request_withdrawal(
    store: &Store,
    policy: &ReferralPolicy,
    beneficiary: Beneficiary,
    amount: Option<i64>,
    payout_method: PayoutMethod,
    payout_number: &str,
    now: DateTime<Utc>,
) -> Result<WithdrawalRequest, LedgerError> {
    let payout_number = payout_number.trim();
    if payout_number.is_empty() {
        return Err(LedgerError::validation("payout number must not be blank"));
    }

    let available = store
        .available_earnings(&beneficiary)?
        .ok_or_else(|| LedgerError::not_found(beneficiary.tag(), beneficiary.id()))?;
    if available < policy.withdrawal_minimum {
        return Err(LedgerError::BelowMinimumThreshold {
            minimum: policy.withdrawal_minimum,
            available,
        });
    }

    let amount = amount.unwrap_or(available);
    if amount <= 0 {
        return Err(LedgerError::validation(format!(
            "withdrawal amount must be positive (got {amount})"
        )));
    }
    if amount > available {
        return Err(LedgerError::validation(format!(
            "withdrawal of {amount} exceeds available earnings of {available}"
        )));
    }

    let request = WithdrawalRequest {
        id: WithdrawalId::new(Uuid::new_v4().to_string()),
        beneficiary,
        amount,
        payout_method,
        payout_number: payout_number.to_string(),
        status: WithdrawalStatus::Pending,
        requested_at: now,
        resolved_at: None,
    };
    store.insert_withdrawal(&request)?;
    tracing::info!(
        withdrawal = %request.id,
        beneficiary = %request.beneficiary,
        amount,
        method = %payout_method,
        "Withdrawal requested"
    );
    Ok(request)
}

pub fn approve_withdrawal(
    store: &Store,
    id: &WithdrawalId,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    match store.pay_withdrawal(id, now)? {
        PayoutOutcome::Paid => {
            tracing::info!(withdrawal = %id, "Withdrawal paid");
            Ok(())
        }
        PayoutOutcome::AlreadyResolved(status) => Err(LedgerError::AlreadyResolved {
            status: status.as_str(),
        }),
        PayoutOutcome::Missing => Err(LedgerError::not_found("withdrawal", id)),
        PayoutOutcome::InsufficientEarnings { available } => {
            tracing::warn!(withdrawal = %id, available, "Withdrawal exceeds recorded earnings");
            Err(LedgerError::Consistency(format!(
                "withdrawal {id} exceeds recorded earnings of {available}"
            )))
        }
    }
}

pub fn reject_withdrawal(
    store: &Store,
    id: &WithdrawalId,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    match store.reject_withdrawal(id, now)? {
        WithdrawalResolution::Rejected => {
            tracing::info!(withdrawal = %id, "Withdrawal rejected");
            Ok(())
        }
        WithdrawalResolution::AlreadyResolved(status) => Err(LedgerError::AlreadyResolved {
            status: status.as_str(),
        }),
        WithdrawalResolution::Missing => Err(LedgerError::not_found("withdrawal", id)),
    }
}
