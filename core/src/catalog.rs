//! Package Catalog: read-only tier and credit-pack definitions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;
use thiserror::Error;

use entitle_config::CatalogConfig;
use entitle_types::{CreditPack, CreditPackId, Package, PackageId, PurchaseKind, Tier};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog id {0} is defined more than once")]
    DuplicateId(String),
    #[error("catalog entry {0} must have a positive price")]
    NonPositivePrice(String),
    #[error("package {0} must last at least one day")]
    ZeroDuration(String),
    #[error("catalog entry {0} grants negative credits")]
    NegativeCredits(String),
    #[error("package {0} sells the free tier")]
    FreeTier(String),
}

/// What approving a claim for a catalog entry grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant<'a> {
    Subscription(&'a Package),
    Credits(&'a CreditPack),
}

impl Grant<'_> {
    #[must_use]
    pub fn credits(&self) -> i64 {
        match self {
            Grant::Subscription(package) => package.credits,
            Grant::Credits(pack) => pack.credits,
        }
    }
}

/// Validated, immutable catalog loaded once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    packages: BTreeMap<PackageId, Package>,
    credit_packs: BTreeMap<CreditPackId, CreditPack>,
}

impl Catalog {
    pub fn from_config(config: CatalogConfig) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        let mut claim = |id: &str| {
            if seen.insert(id.to_string()) {
                Ok(())
            } else {
                Err(CatalogError::DuplicateId(id.to_string()))
            }
        };

        let mut packages = BTreeMap::new();
        for package in config.packages {
            let id = package.id.as_str();
            claim(id)?;
            if package.price <= 0 {
                return Err(CatalogError::NonPositivePrice(id.to_string()));
            }
            if package.duration_days == 0 {
                return Err(CatalogError::ZeroDuration(id.to_string()));
            }
            if package.credits < 0 {
                return Err(CatalogError::NegativeCredits(id.to_string()));
            }
            if !package.tier.is_paid() {
                return Err(CatalogError::FreeTier(id.to_string()));
            }
            packages.insert(package.id.clone(), package);
        }

        let mut credit_packs = BTreeMap::new();
        for pack in config.credit_packs {
            let id = pack.id.as_str();
            claim(id)?;
            if pack.price <= 0 {
                return Err(CatalogError::NonPositivePrice(id.to_string()));
            }
            if pack.credits < 0 {
                return Err(CatalogError::NegativeCredits(id.to_string()));
            }
            credit_packs.insert(pack.id.clone(), pack);
        }

        Ok(Self {
            packages,
            credit_packs,
        })
    }

    /// The catalog shipped with the service.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_config(CatalogConfig::builtin())
    }

    #[must_use]
    pub fn package(&self, id: &PackageId) -> Option<&Package> {
        self.packages.get(id)
    }

    #[must_use]
    pub fn credit_pack(&self, id: &CreditPackId) -> Option<&CreditPack> {
        self.credit_packs.get(id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn credit_packs(&self) -> impl Iterator<Item = &CreditPack> {
        self.credit_packs.values()
    }

    /// The cheapest package selling `tier`.
    #[must_use]
    pub fn package_for_tier(&self, tier: Tier) -> Option<&Package> {
        self.packages
            .values()
            .filter(|package| package.tier == tier)
            .min_by_key(|package| package.price)
    }

    /// Tier of the cheapest package on sale; the upsell target for free accounts.
    #[must_use]
    pub fn entry_tier(&self) -> Tier {
        self.packages
            .values()
            .min_by_key(|package| package.price)
            .map_or(Tier::Tier1, |package| package.tier)
    }

    /// Resolve the target of a purchase, `None` if it is not on sale.
    #[must_use]
    pub fn resolve(&self, kind: &PurchaseKind) -> Option<Grant<'_>> {
        match kind {
            PurchaseKind::PackageSubscription { package_id } => {
                self.package(package_id).map(Grant::Subscription)
            }
            PurchaseKind::CreditTopUp { credit_pack_id } => {
                self.credit_pack(credit_pack_id).map(Grant::Credits)
            }
        }
    }
}

pub(crate) fn subscription_length(package: &Package) -> TimeDelta {
    TimeDelta::days(i64::from(package.duration_days))
}
