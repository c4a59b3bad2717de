pub mod clock;
pub mod registry;
pub mod token_bucket;

use crate::config::Tier;
use serde::Serialize;

/// Response from a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the unit of work is admitted
    pub allowed: bool,

    /// Tokens left after the check
    pub remaining: u64,

    /// Seconds until the next unit would be admitted (0 when allowed)
    pub retry_after_secs: u64,
}

/// Trait for per-identity admission decisions
pub trait RateLimiter: Send + Sync {
    /// Check if a unit of work is allowed and consume a token if so
    fn check(&self, key: &str, tier: Tier) -> Decision;

    /// Tokens available for the key without consuming
    fn remaining_tokens(&self, key: &str, tier: Tier) -> u64;

    /// Seconds until the key's next unit of work would be admitted, without
    /// consuming. Zero when a token is available now.
    fn seconds_until_refill(&self, key: &str, tier: Tier) -> u64;

    fn allow(&self, key: &str, tier: Tier) -> bool {
        self.check(key, tier).allowed
    }
}
