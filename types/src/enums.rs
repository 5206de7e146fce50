use std::fmt;

use thiserror::Error;

/// Which stored enum failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumKind {
    Tier,
    Role,
    PurchaseKind,
    PurchaseStatus,
    WithdrawalStatus,
    PayoutMethod,
    Beneficiary,
}

impl EnumKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EnumKind::Tier => "subscription tier",
            EnumKind::Role => "account role",
            EnumKind::PurchaseKind => "purchase kind",
            EnumKind::PurchaseStatus => "purchase status",
            EnumKind::WithdrawalStatus => "withdrawal status",
            EnumKind::PayoutMethod => "payout method",
            EnumKind::Beneficiary => "beneficiary kind",
        }
    }
}

impl fmt::Display for EnumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} value '{raw}'; expected one of: {expected:?}")]
pub struct EnumParseError {
    kind: EnumKind,
    raw: String,
    expected: &'static [&'static str],
}

impl EnumParseError {
    #[must_use]
    pub fn new(kind: EnumKind, raw: impl Into<String>, expected: &'static [&'static str]) -> Self {
        Self {
            kind,
            raw: raw.into(),
            expected,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EnumKind {
        self.kind
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}
