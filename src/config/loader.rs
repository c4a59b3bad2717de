use crate::config::validator::validate_config;
use crate::config::{AppConfig, RateLimitConfig, ServiceConfig, TierTable};
use crate::errors::{RateLimitError, Result};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load rate limit configuration from JSON file
pub async fn load_rate_limit_config_from_file<P: AsRef<Path>>(path: P) -> Result<RateLimitConfig> {
    let path = path.as_ref();
    info!("Loading rate limit configuration from: {}", path.display());

    let contents = tokio::fs::read_to_string(path).await?;
    let config: RateLimitConfig = serde_json::from_str(&contents)?;

    validate_config(&config)?;

    info!("Rate limit configuration loaded and validated successfully");
    log_rate_limit_config_summary(&config);

    Ok(config)
}

/// Load complete application configuration
/// - Service settings from environment variables
/// - Tier configuration from JSON file (built-in defaults if the file is absent)
pub async fn load_config() -> Result<AppConfig> {
    info!("Loading application configuration...");

    let service = ServiceConfig::from_env();
    debug!("Rate limit config path: {}", service.config_path.display());

    let rate_limits = match load_rate_limit_config_from_file(&service.config_path).await {
        Ok(config) => config,
        Err(RateLimitError::FileSystemError(e)) if e.kind() == ErrorKind::NotFound => {
            warn!(
                "Config file '{}' not found. Using built-in tier defaults.",
                service.config_path.display()
            );
            RateLimitConfig::default()
        }
        Err(e) => return Err(e),
    };

    let app_config = AppConfig {
        service,
        rate_limits,
    };

    info!("Application configuration loaded successfully");
    log_config_summary(&app_config);

    Ok(app_config)
}

/// Build a TierTable from AppConfig
pub fn build_tier_table(config: &AppConfig) -> Result<TierTable> {
    TierTable::new(config.rate_limits.clone())
}

/// Log a summary of the loaded configuration (AppConfig)
fn log_config_summary(config: &AppConfig) {
    info!("=== Configuration Summary ===");
    info!("Config Path: {}", config.service.config_path.display());
    info!("Config Hot Reload: {}", config.service.watch_config);
    info!("Metrics Port: {}", config.service.metrics_port);

    let rate_limits = &config.rate_limits;
    info!("Tiers: {}", rate_limits.tiers.len());
    for (tier, limits) in &rate_limits.tiers {
        info!(
            "  {}: capacity {}, refill {} per {}s",
            tier, limits.capacity, limits.refill_tokens, limits.refill_period_secs
        );
    }
    info!("Default Tier: {}", rate_limits.default_tier);
    info!("Anonymous Tier: {}", rate_limits.anonymous_tier);
    match rate_limits.fallback_tier {
        Some(tier) => info!("Fallback Tier: {}", tier),
        None => info!("Fallback Tier: none (unknown tiers are rejected)"),
    }
    info!("On Tier Change: {:?}", rate_limits.on_tier_change);
    info!(
        "Registry: max {} keys, idle timeout {}s",
        rate_limits.registry.max_keys, rate_limits.registry.idle_timeout_secs
    );
    info!("=============================");
}

/// Log only the RateLimitConfig summary (used by the reload path)
fn log_rate_limit_config_summary(config: &RateLimitConfig) {
    debug!("=== RateLimitConfig Summary ===");
    for (tier, limits) in &config.tiers {
        debug!(
            "  {}: capacity {}, refill {} per {}s",
            tier, limits.capacity, limits.refill_tokens, limits.refill_period_secs
        );
    }
    debug!(
        "Default: {}, anonymous: {}, fallback: {:?}",
        config.default_tier, config.anonymous_tier, config.fallback_tier
    );
    debug!("===============================");
}
