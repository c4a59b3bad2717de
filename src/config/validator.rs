use crate::config::{RateLimitConfig, RegistryConfig, Tier, TierLimits};
use crate::errors::{RateLimitError, Result};
use tracing::{debug, warn};

/// Validate the rate limit configuration
pub fn validate_config(config: &RateLimitConfig) -> Result<()> {
    debug!("Validating configuration...");

    if config.tiers.is_empty() {
        return Err(RateLimitError::ConfigurationError(
            "At least one tier must be configured".to_string(),
        ));
    }

    for (tier, limits) in &config.tiers {
        validate_tier_limits(*tier, limits)?;
    }

    validate_tier_coverage(config)?;
    validate_registry_config(&config.registry)?;

    debug!("Configuration validation successful");
    Ok(())
}

/// Every tier must resolve to limits, either directly or via the fallback tier
fn validate_tier_coverage(config: &RateLimitConfig) -> Result<()> {
    if let Some(fallback) = config.fallback_tier {
        if !config.tiers.contains_key(&fallback) {
            return Err(RateLimitError::ConfigurationError(format!(
                "Fallback tier '{}' has no limits configured",
                fallback
            )));
        }
        return Ok(());
    }

    for tier in Tier::ALL {
        if !config.tiers.contains_key(&tier) {
            return Err(RateLimitError::ConfigurationError(format!(
                "Tier '{}' has no limits configured and no fallback tier is set",
                tier
            )));
        }
    }
    Ok(())
}

/// Validate registry bounds
fn validate_registry_config(config: &RegistryConfig) -> Result<()> {
    if config.max_keys == 0 {
        return Err(RateLimitError::ConfigurationError(
            "registry.max_keys must be greater than 0".to_string(),
        ));
    }

    if config.idle_timeout_secs == 0 {
        return Err(RateLimitError::ConfigurationError(
            "registry.idle_timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.max_keys > 10_000_000 {
        warn!(
            "registry.max_keys is very high ({}). This may consume excessive memory.",
            config.max_keys
        );
    }

    Ok(())
}

/// Validate the limits of a single tier
fn validate_tier_limits(tier: Tier, limits: &TierLimits) -> Result<()> {
    if limits.capacity == 0 {
        return Err(RateLimitError::InvalidRate(format!(
            "capacity must be positive for tier '{}'",
            tier
        )));
    }

    if limits.refill_tokens == 0 {
        return Err(RateLimitError::InvalidRate(format!(
            "refill_tokens must be positive for tier '{}'",
            tier
        )));
    }

    if limits.refill_period_secs == 0 {
        return Err(RateLimitError::InvalidRate(format!(
            "refill_period_secs must be positive for tier '{}'",
            tier
        )));
    }

    if limits.capacity > 1_000_000_000 {
        warn!(
            "Very high capacity ({}) for tier '{}'",
            limits.capacity, tier
        );
    }

    let seconds_to_fill =
        limits.capacity as f64 * limits.refill_period_secs as f64 / limits.refill_tokens as f64;
    if seconds_to_fill > 86400.0 {
        warn!(
            "Tier '{}' takes {:.2} hours to refill from empty",
            tier,
            seconds_to_fill / 3600.0
        );
    }

    if limits.refill_tokens > limits.capacity {
        warn!(
            "Tier '{}' refills {} tokens per period but holds at most {}",
            tier, limits.refill_tokens, limits.capacity
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&RateLimitConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let limits = TierLimits {
            capacity: 0,
            refill_tokens: 5,
            refill_period_secs: 60,
        };
        assert!(matches!(
            validate_tier_limits(Tier::Standard, &limits),
            Err(RateLimitError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_validate_zero_refill() {
        let limits = TierLimits {
            capacity: 5,
            refill_tokens: 0,
            refill_period_secs: 60,
        };
        assert!(validate_tier_limits(Tier::Standard, &limits).is_err());

        let limits = TierLimits {
            capacity: 5,
            refill_tokens: 5,
            refill_period_secs: 0,
        };
        assert!(validate_tier_limits(Tier::Standard, &limits).is_err());
    }

    #[test]
    fn test_validate_empty_tiers() {
        let mut config = RateLimitConfig::default();
        config.tiers.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_fallback_must_be_configured() {
        let mut config = RateLimitConfig::default();
        config.tiers.remove(&Tier::Standard);
        assert!(validate_config(&config).is_err());

        config.fallback_tier = Some(Tier::Guest);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_registry_bounds() {
        let mut config = RateLimitConfig::default();
        config.registry.max_keys = 0;
        assert!(validate_config(&config).is_err());

        let mut config = RateLimitConfig::default();
        config.registry.idle_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
