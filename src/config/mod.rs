pub mod loader;
pub mod validator;
pub mod watcher;

use crate::errors::{RateLimitError, Result};
use crate::limiter::token_bucket::BucketLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Process settings (loaded from environment variables only)
    pub service: ServiceConfig,

    /// Tier and registry configuration (loaded from file, supports hot reload)
    pub rate_limits: RateLimitConfig,
}

/// Process-level settings (loaded from environment variables)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path of the JSON tier configuration
    pub config_path: PathBuf,

    /// Port of the Prometheus `/metrics` endpoint
    pub metrics_port: u16,

    /// Reload the tier configuration when the file changes
    pub watch_config: bool,
}

impl ServiceConfig {
    /// Load service configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            config_path: std::env::var("RATE_LIMIT_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/rate_limits.json")),

            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9090),

            watch_config: std::env::var("RATE_LIMIT_WATCH_CONFIG")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/rate_limits.json"),
            metrics_port: 9090,
            watch_config: true,
        }
    }
}

/// Service tier of a customer. The set is closed; each tier maps to one
/// `(capacity, refill)` pair in the [`TierTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    #[serde(alias = "guest", alias = "Guest")]
    Guest,
    #[serde(alias = "standard", alias = "Standard")]
    Standard,
    #[serde(alias = "premium", alias = "Premium")]
    Premium,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Guest, Tier::Standard, Tier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Guest => "GUEST",
            Tier::Standard => "STANDARD",
            Tier::Premium => "PREMIUM",
        }
    }

    /// Position of the tier in [`Tier::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Tier::Guest => 0,
            Tier::Standard => 1,
            Tier::Premium => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "GUEST" => Ok(Tier::Guest),
            "STANDARD" => Ok(Tier::Standard),
            "PREMIUM" => Ok(Tier::Premium),
            _ => Err(RateLimitError::UnknownTier(s.to_string())),
        }
    }
}

/// What the registry does when a known key presents a tier whose limits
/// differ from the ones its bucket was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierChangePolicy {
    /// The bucket keeps the limits of the first tier seen for the key.
    #[default]
    Keep,
    /// The bucket is resized to the presented tier; tokens are clamped to
    /// the new capacity, never topped up.
    Rebind,
}

/// Rate limiting configuration (loaded from JSON file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Limits per tier
    #[serde(default = "default_tiers")]
    pub tiers: BTreeMap<Tier, TierLimits>,

    /// Tier for identified customers that present no tier
    #[serde(default = "default_standard_tier")]
    pub default_tier: Tier,

    /// Tier for requests without a customer identity
    #[serde(default = "default_anonymous_tier")]
    pub anonymous_tier: Tier,

    /// Tier used for unknown tier names and for tiers missing from `tiers`.
    /// Without one, both are configuration errors.
    #[serde(default = "default_fallback_tier")]
    pub fallback_tier: Option<Tier>,

    #[serde(default)]
    pub on_tier_change: TierChangePolicy,

    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            default_tier: default_standard_tier(),
            anonymous_tier: default_anonymous_tier(),
            fallback_tier: default_fallback_tier(),
            on_tier_change: TierChangePolicy::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Limits of a single tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Maximum bucket size (burst)
    pub capacity: u64,

    /// Tokens restored per refill period
    pub refill_tokens: u64,

    /// Length of the refill period in seconds
    #[serde(default = "default_refill_period_secs")]
    pub refill_period_secs: u64,
}

impl TierLimits {
    pub fn per_minute(tokens: u64) -> Self {
        Self {
            capacity: tokens,
            refill_tokens: tokens,
            refill_period_secs: 60,
        }
    }

    pub fn to_bucket_limits(&self) -> Result<BucketLimits> {
        BucketLimits::new(
            self.capacity,
            self.refill_tokens,
            Duration::from_secs(self.refill_period_secs),
        )
    }
}

/// Bounds of the key -> bucket registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of tracked keys
    #[serde(default = "default_max_keys")]
    pub max_keys: u64,

    /// Buckets untouched for this long are dropped
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl RegistryConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Runtime tier lookup built from a validated [`RateLimitConfig`].
///
/// Every tier resolves to limits: tiers absent from the config use the
/// fallback tier's limits.
pub struct TierTable {
    /// Bucket limits indexed by [`Tier::index`]
    limits: [BucketLimits; 3],

    default_tier: Tier,
    anonymous_tier: Tier,
    fallback_tier: Option<Tier>,
    on_tier_change: TierChangePolicy,

    /// Full configuration (for observability)
    full_config: Arc<RateLimitConfig>,
}

impl TierTable {
    /// Create a new tier table from rate limit configuration
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        validator::validate_config(&config)?;

        let default_source = config.fallback_tier.unwrap_or(config.default_tier);
        let default_limits = match config.tiers.get(&default_source) {
            Some(tier_limits) => tier_limits.to_bucket_limits()?,
            None => {
                return Err(RateLimitError::ConfigurationError(format!(
                    "Tier '{}' has no limits configured",
                    default_source
                )))
            }
        };

        let mut limits = [default_limits; 3];
        for (tier, tier_limits) in &config.tiers {
            limits[tier.index()] = tier_limits.to_bucket_limits()?;
        }

        Ok(Self {
            limits,
            default_tier: config.default_tier,
            anonymous_tier: config.anonymous_tier,
            fallback_tier: config.fallback_tier,
            on_tier_change: config.on_tier_change,
            full_config: Arc::new(config),
        })
    }

    /// Get bucket limits for a tier
    pub fn limits(&self, tier: Tier) -> BucketLimits {
        self.limits[tier.index()]
    }

    /// Parse a tier name presented by a caller, applying the fallback tier
    /// to names outside the known set.
    pub fn parse_tier(&self, name: &str) -> Result<Tier> {
        match name.parse::<Tier>() {
            Ok(tier) => Ok(tier),
            Err(e) => self.fallback_tier.ok_or(e),
        }
    }

    pub fn default_tier(&self) -> Tier {
        self.default_tier
    }

    pub fn anonymous_tier(&self) -> Tier {
        self.anonymous_tier
    }

    pub fn on_tier_change(&self) -> TierChangePolicy {
        self.on_tier_change
    }

    /// Get the full configuration (for observability)
    pub fn get_full_config(&self) -> Arc<RateLimitConfig> {
        Arc::clone(&self.full_config)
    }

    /// Get statistics about the table
    pub fn stats(&self) -> TierTableStats {
        TierTableStats {
            tier_count: self.limits.len(),
            configured_tier_count: self.full_config.tiers.len(),
        }
    }
}

/// Statistics about the tier table
#[derive(Debug, Clone)]
pub struct TierTableStats {
    /// Tiers resolvable to limits (always every tier)
    pub tier_count: usize,
    /// Tiers with explicit limits in the config
    pub configured_tier_count: usize,
}

fn default_tiers() -> BTreeMap<Tier, TierLimits> {
    BTreeMap::from([
        (Tier::Guest, TierLimits::per_minute(2)),
        (Tier::Standard, TierLimits::per_minute(5)),
        (Tier::Premium, TierLimits::per_minute(20)),
    ])
}

fn default_standard_tier() -> Tier {
    Tier::Standard
}

fn default_anonymous_tier() -> Tier {
    Tier::Guest
}

fn default_fallback_tier() -> Option<Tier> {
    Some(Tier::Standard)
}

fn default_refill_period_secs() -> u64 {
    60
}

fn default_max_keys() -> u64 {
    100_000
}

fn default_idle_timeout_secs() -> u64 {
    3600
}
