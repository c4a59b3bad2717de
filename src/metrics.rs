use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_counter_vec,
    register_int_gauge, CounterVec, Gauge, HistogramVec, IntCounterVec, IntGauge,
};

lazy_static! {
    // Decision metrics
    pub static ref DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tierlimit_decisions_total",
        "Total number of admission decisions",
        &["tier", "allowed"]
    ).unwrap();

    pub static ref RETRY_AFTER_SECONDS: HistogramVec = register_histogram_vec!(
        "tierlimit_retry_after_seconds",
        "Wait reported to denied callers in seconds",
        &["tier"],
        vec![1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Registry metrics
    pub static ref BUCKETS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tierlimit_buckets_created_total",
        "Total number of buckets created",
        &["tier"]
    ).unwrap();

    pub static ref BUCKETS_EVICTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tierlimit_buckets_evicted_total",
        "Total number of buckets removed from the registry",
        &["cause"]
    ).unwrap();

    pub static ref TIER_REBINDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tierlimit_tier_rebinds_total",
        "Total number of buckets resized to a new tier",
        &["tier"]
    ).unwrap();

    pub static ref ACTIVE_BUCKETS: IntGauge = register_int_gauge!(
        "tierlimit_active_buckets",
        "Number of buckets currently tracked"
    ).unwrap();

    // Config metrics
    pub static ref CONFIG_RELOADS_TOTAL: CounterVec = register_counter_vec!(
        "tierlimit_config_reloads_total",
        "Total number of configuration reloads",
        &["result"]
    ).unwrap();

    pub static ref CONFIGURED_TIERS: Gauge = register_gauge!(
        "tierlimit_configured_tiers",
        "Number of tiers with explicit limits"
    ).unwrap();
}

/// Record an admission decision
pub fn record_decision(tier: &str, allowed: bool) {
    let allowed_str = if allowed { "true" } else { "false" };
    DECISIONS_TOTAL
        .with_label_values(&[tier, allowed_str])
        .inc();
}

/// Record the wait handed to a denied caller
pub fn record_retry_after(tier: &str, secs: u64) {
    RETRY_AFTER_SECONDS
        .with_label_values(&[tier])
        .observe(secs as f64);
}

/// Record bucket creation
pub fn record_bucket_created(tier: &str) {
    BUCKETS_CREATED_TOTAL
        .with_label_values(&[tier])
        .inc();
}

/// Record bucket removal
pub fn record_bucket_evicted(cause: &str) {
    BUCKETS_EVICTED_TOTAL
        .with_label_values(&[cause])
        .inc();
}

/// Record a bucket resized to another tier
pub fn record_tier_rebind(tier: &str) {
    TIER_REBINDS_TOTAL
        .with_label_values(&[tier])
        .inc();
}

pub fn update_active_buckets(count: u64) {
    ACTIVE_BUCKETS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

/// Update config metrics
pub fn update_config_metrics(tier_count: usize) {
    CONFIGURED_TIERS.set(tier_count as f64);
}

/// Record config reload
pub fn record_config_reload(success: bool) {
    let result = if success { "success" } else { "error" };
    CONFIG_RELOADS_TOTAL
        .with_label_values(&[result])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_decision_increments_counter() {
        let before = DECISIONS_TOTAL
            .with_label_values(&["TEST_TIER", "false"])
            .get();
        record_decision("TEST_TIER", false);
        let after = DECISIONS_TOTAL
            .with_label_values(&["TEST_TIER", "false"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_active_buckets_gauge() {
        update_active_buckets(42);
        assert_eq!(ACTIVE_BUCKETS.get(), 42);
    }
}
