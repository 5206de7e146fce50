//! Configuration for the entitlement ledger.
//!
//! Loaded from `~/.entitle/config.toml` (or the file named by `ENTITLE_CONFIG`).
//! Every section is optional; missing sections fall back to built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

use entitle_types::{CreditPack, CreditPackId, ModelLimit, Package, PackageId, Tier};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PEER_COMMISSION_PERCENT: u32 = 10;
const DEFAULT_WITHDRAWAL_MINIMUM: i64 = 1_000;
const DEFAULT_STATS_TTL_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntitleConfig {
    pub store: Option<StoreConfig>,
    pub referral: Option<ReferralConfig>,
    pub cache: Option<CacheConfig>,
    pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Database file. Supports `${VAR}` expansion.
    pub path: Option<String>,
    /// Upper bound on how long one persistence call waits for a lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReferralConfig {
    /// Commission rate for account-to-account referrals.
    #[serde(default = "default_peer_commission_percent")]
    pub peer_commission_percent: u32,
    /// Earnings a beneficiary must hold before requesting a payout.
    #[serde(default = "default_withdrawal_minimum")]
    pub withdrawal_minimum: i64,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            peer_commission_percent: DEFAULT_PEER_COMMISSION_PERCENT,
            withdrawal_minimum: DEFAULT_WITHDRAWAL_MINIMUM,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of the cached admin statistics. Zero disables caching.
    #[serde(default = "default_stats_ttl_secs")]
    pub stats_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stats_ttl_secs: DEFAULT_STATS_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub credit_packs: Vec<CreditPack>,
}

impl CatalogConfig {
    /// The catalog shipped with the service.
    #[must_use]
    pub fn builtin() -> Self {
        let package = |id: &str, tier, price, credits, model_limit| Package {
            id: PackageId::new(id),
            tier,
            price,
            duration_days: 30,
            credits,
            model_limit,
        };
        let pack = |id: &str, credits, price| CreditPack {
            id: CreditPackId::new(id),
            credits,
            price,
        };

        Self {
            packages: vec![
                package("package1", Tier::Tier1, 299, 100, ModelLimit::Limited(3)),
                package("package2", Tier::Tier2, 599, 300, ModelLimit::Limited(10)),
                package("package3", Tier::Vip, 999, 1_000, ModelLimit::Unlimited),
            ],
            credit_packs: vec![
                pack("credits_100", 100, 100),
                pack("credits_300", 300, 250),
                pack("credits_1000", 1_000, 750),
            ],
        }
    }
}

// Default value functions for serde
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

const fn default_peer_commission_percent() -> u32 {
    DEFAULT_PEER_COMMISSION_PERCENT
}

const fn default_withdrawal_minimum() -> i64 {
    DEFAULT_WITHDRAWAL_MINIMUM
}

const fn default_stats_ttl_secs() -> u64 {
    DEFAULT_STATS_TTL_SECS
}

/// Expand `${VAR}` references from the environment. Unset variables become empty.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl EntitleConfig {
    /// Load the config file if one exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        Self::from_toml_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolved database path: configured (with env expansion) or the default.
    #[must_use]
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store
            .as_ref()
            .and_then(|store| store.path.as_deref())
            .map(|raw| PathBuf::from(expand_env_vars(raw)))
            .or_else(default_db_path)
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        let millis = self
            .store
            .as_ref()
            .map_or(DEFAULT_BUSY_TIMEOUT_MS, |store| store.busy_timeout_ms);
        Duration::from_millis(millis)
    }

    #[must_use]
    pub fn peer_commission_percent(&self) -> u32 {
        self.referral
            .as_ref()
            .map_or(DEFAULT_PEER_COMMISSION_PERCENT, |r| r.peer_commission_percent)
    }

    #[must_use]
    pub fn withdrawal_minimum(&self) -> i64 {
        self.referral
            .as_ref()
            .map_or(DEFAULT_WITHDRAWAL_MINIMUM, |r| r.withdrawal_minimum)
    }

    #[must_use]
    pub fn stats_ttl(&self) -> Duration {
        let secs = self
            .cache
            .as_ref()
            .map_or(DEFAULT_STATS_TTL_SECS, |cache| cache.stats_ttl_secs);
        Duration::from_secs(secs)
    }

    /// Configured catalog, or the built-in one when the section is absent.
    #[must_use]
    pub fn catalog(&self) -> CatalogConfig {
        self.catalog.clone().unwrap_or_else(CatalogConfig::builtin)
    }
}

/// `~/.entitle`
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".entitle"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = env::var("ENTITLE_CONFIG")
        && !explicit.trim().is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

#[must_use]
pub fn default_db_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("ledger.db"))
}
