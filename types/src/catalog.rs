//! Subscription tiers and purchasable catalog entries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::enums::{EnumKind, EnumParseError};
use crate::ids::{CreditPackId, PackageId};

/// Subscription tier held by an account.
///
/// `Vip` is an implicit universal model grant: it is checked at read time and
/// never populates an account's unlock sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Tier1,
    Tier2,
    Vip,
}

impl Tier {
    const NAMES: &'static [&'static str] = &["free", "tier1", "tier2", "vip"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Tier1 => "tier1",
            Tier::Tier2 => "tier2",
            Tier::Vip => "vip",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Tier1 => "Tier 1",
            Tier::Tier2 => "Tier 2",
            Tier::Vip => "VIP",
        }
    }

    #[must_use]
    pub const fn is_paid(self) -> bool {
        !matches!(self, Tier::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Tier {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "tier1" => Ok(Tier::Tier1),
            "tier2" => Ok(Tier::Tier2),
            "vip" => Ok(Tier::Vip),
            _ => Err(EnumParseError::new(EnumKind::Tier, s, Self::NAMES)),
        }
    }
}

/// How many distinct models a package lets an account unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ModelLimitWire", into = "ModelLimitWire")]
pub enum ModelLimit {
    Limited(u32),
    Unlimited,
}

impl ModelLimit {
    /// Whether an account already holding `held` slots may take one more.
    #[must_use]
    pub const fn admits(self, held: usize) -> bool {
        match self {
            ModelLimit::Limited(limit) => held < limit as usize,
            ModelLimit::Unlimited => true,
        }
    }

    /// Slot count for persistence; `None` means unlimited.
    #[must_use]
    pub const fn as_count(self) -> Option<u32> {
        match self {
            ModelLimit::Limited(limit) => Some(limit),
            ModelLimit::Unlimited => None,
        }
    }
}

impl fmt::Display for ModelLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelLimit::Limited(limit) => write!(f, "{limit}"),
            ModelLimit::Unlimited => f.write_str("unlimited"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ModelLimitWire {
    Count(u32),
    Keyword(String),
}

impl TryFrom<ModelLimitWire> for ModelLimit {
    type Error = String;

    fn try_from(value: ModelLimitWire) -> Result<Self, Self::Error> {
        match value {
            ModelLimitWire::Count(count) => Ok(ModelLimit::Limited(count)),
            ModelLimitWire::Keyword(word) if word.eq_ignore_ascii_case("unlimited") => {
                Ok(ModelLimit::Unlimited)
            }
            ModelLimitWire::Keyword(word) => Err(format!(
                "model_limit must be a number or \"unlimited\" (got \"{word}\")"
            )),
        }
    }
}

impl From<ModelLimit> for ModelLimitWire {
    fn from(value: ModelLimit) -> Self {
        match value {
            ModelLimit::Limited(count) => ModelLimitWire::Count(count),
            ModelLimit::Unlimited => ModelLimitWire::Keyword("unlimited".to_string()),
        }
    }
}

/// A purchasable subscription tier definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub tier: Tier,
    /// Price in minor currency units.
    pub price: i64,
    pub duration_days: u32,
    /// Wallet credits granted on approval.
    pub credits: i64,
    pub model_limit: ModelLimit,
}

/// A one-off wallet top-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPack {
    pub id: CreditPackId,
    pub credits: i64,
    pub price: i64,
}
