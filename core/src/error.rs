//! Errors surfaced to ledger callers.
//!
//! Storage failures are collapsed into two generic, retryable variants. The
//! underlying detail is logged where the conversion happens and never shown
//! to the caller.

use thiserror::Error;

use entitle_store::StoreError;
use entitle_types::Tier;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    /// The request left Pending earlier; `status` is the recorded outcome.
    #[error("request was already {status}")]
    AlreadyResolved { status: &'static str },
    #[error("insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },
    #[error("a {} subscription or higher is required", required_tier.display_name())]
    SubscriptionRequired { required_tier: Tier },
    #[error("model slot limit reached ({limit} of {limit} used)")]
    SlotLimitReached { limit: u32 },
    #[error("earnings of {available} are below the withdrawal minimum of {minimum}")]
    BelowMinimumThreshold { minimum: i64, available: i64 },
    #[error("ledger inconsistency: {0}")]
    Consistency(String),
    #[error("the ledger is busy, please try again")]
    IoTimeout,
    #[error("the ledger is unavailable, please try again")]
    IoUnavailable,
}

impl LedgerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::IoTimeout | LedgerError::IoUnavailable)
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        if err.is_retryable() {
            tracing::warn!(error = %err, "Ledger storage timed out");
            LedgerError::IoTimeout
        } else {
            tracing::warn!(error = %err, "Ledger storage failed");
            LedgerError::IoUnavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_detail_never_reaches_the_message() {
        let err = LedgerError::from(StoreError::Busy);
        assert!(matches!(err, LedgerError::IoTimeout));
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "the ledger is busy, please try again");
    }

    #[test]
    fn upsell_errors_carry_what_is_missing() {
        let err = LedgerError::SubscriptionRequired {
            required_tier: Tier::Tier1,
        };
        assert_eq!(err.to_string(), "a Tier 1 subscription or higher is required");

        let err = LedgerError::InsufficientBalance {
            required: 50,
            available: 40,
        };
        assert!(err.to_string().contains("50 required"));
        assert!(!err.is_retryable());
    }
}
