use crate::config::{RegistryConfig, Tier, TierChangePolicy, TierTable};
use crate::limiter::clock::{Clock, SystemClock};
use crate::limiter::token_bucket::{ceil_secs, Bucket};
use crate::limiter::{Decision, RateLimiter};
use crate::metrics;
use arc_swap::ArcSwap;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Concurrent, bounded map from identity key to token bucket.
///
/// Buckets are created lazily, sized by the tier presented the first time a
/// key is seen. The map is capped at `max_keys` entries and drops buckets
/// idle for longer than `idle_timeout`; an evicted key starts over with a
/// full bucket.
pub struct LimiterRegistry {
    buckets: Cache<String, Arc<Bucket>>,
    tiers: Arc<ArcSwap<TierTable>>,
    clock: Arc<dyn Clock>,
    created: AtomicU64,
}

impl LimiterRegistry {
    /// Create a registry on the system clock
    pub fn new(tiers: Arc<ArcSwap<TierTable>>, settings: &RegistryConfig) -> Self {
        Self::with_clock(tiers, settings, Arc::new(SystemClock::new()))
    }

    /// Create a registry whose buckets read time from `clock`
    pub fn with_clock(
        tiers: Arc<ArcSwap<TierTable>>,
        settings: &RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let buckets = Cache::builder()
            .max_capacity(settings.max_keys)
            // New keys are always admitted; the least recently used key makes room.
            .eviction_policy(EvictionPolicy::lru())
            .time_to_idle(settings.idle_timeout())
            .eviction_listener(|key: Arc<String>, _bucket: Arc<Bucket>, cause| {
                let cause = removal_cause_label(cause);
                debug!("Bucket removed: key={}, cause={}", key, cause);
                metrics::record_bucket_evicted(cause);
            })
            .build();

        Self {
            buckets,
            tiers,
            clock,
            created: AtomicU64::new(0),
        }
    }

    /// Shared handle to the tier table (swapped on config reload)
    pub fn tiers(&self) -> Arc<ArcSwap<TierTable>> {
        Arc::clone(&self.tiers)
    }

    /// Return the bucket for `key`, creating it from `tier`'s limits if the
    /// key is unseen. Concurrent callers for the same unseen key all receive
    /// the same bucket.
    pub fn resolve(&self, key: &str, tier: Tier) -> Arc<Bucket> {
        let table = self.tiers.load();
        let limits = table.limits(tier);

        let bucket = self.buckets.get_with_by_ref(key, || {
            info!(
                "Creating new bucket for key: {} with tier: {} (capacity: {}, refill: {}/{}s)",
                key,
                tier,
                limits.capacity(),
                limits.refill_tokens(),
                limits.refill_period().as_secs()
            );
            self.created.fetch_add(1, Ordering::Relaxed);
            metrics::record_bucket_created(tier.as_str());
            Arc::new(Bucket::with_clock(limits, Arc::clone(&self.clock)))
        });

        if table.on_tier_change() == TierChangePolicy::Rebind && bucket.rebind(limits) {
            info!(
                "Rebound bucket for key: {} to tier: {} (capacity: {})",
                key,
                tier,
                limits.capacity()
            );
            metrics::record_tier_rebind(tier.as_str());
        }

        bucket
    }

    /// Whether a bucket is currently tracked for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Drop the bucket for `key`; the next request starts with a full bucket
    pub fn invalidate(&self, key: &str) {
        self.buckets.invalidate(key);
    }

    /// Number of tracked buckets, after applying pending evictions
    pub fn bucket_count(&self) -> u64 {
        self.buckets.run_pending_tasks();
        self.buckets.entry_count()
    }

    /// Apply pending evictions and refresh the active bucket gauge
    pub fn run_maintenance(&self) {
        let count = self.bucket_count();
        metrics::update_active_buckets(count);
        debug!("Registry maintenance: {} active buckets", count);
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_buckets: self.bucket_count(),
            buckets_created: self.created.load(Ordering::Relaxed),
        }
    }
}

impl RateLimiter for LimiterRegistry {
    fn check(&self, key: &str, tier: Tier) -> Decision {
        let outcome = self.resolve(key, tier).try_consume_one();
        let decision = Decision {
            allowed: outcome.consumed,
            remaining: outcome.remaining,
            retry_after_secs: outcome.retry_after_secs(),
        };

        debug!(
            "Rate limit decision: key={}, tier={}, allowed={}, remaining={}, retry_after={}s",
            key, tier, decision.allowed, decision.remaining, decision.retry_after_secs
        );
        metrics::record_decision(tier.as_str(), decision.allowed);
        if !decision.allowed {
            metrics::record_retry_after(tier.as_str(), decision.retry_after_secs);
        }

        decision
    }

    fn remaining_tokens(&self, key: &str, tier: Tier) -> u64 {
        self.resolve(key, tier).available_tokens()
    }

    fn seconds_until_refill(&self, key: &str, tier: Tier) -> u64 {
        ceil_secs(self.resolve(key, tier).time_until_next_token())
    }
}

/// Statistics about the registry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub active_buckets: u64,
    pub buckets_created: u64,
}

fn removal_cause_label(cause: RemovalCause) -> &'static str {
    match cause {
        RemovalCause::Expired => "expired",
        RemovalCause::Explicit => "explicit",
        RemovalCause::Replaced => "replaced",
        RemovalCause::Size => "size",
    }
}
