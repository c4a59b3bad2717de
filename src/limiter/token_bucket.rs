use crate::errors::{RateLimitError, Result};
use crate::limiter::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Validated sizing of a token bucket: `capacity` tokens at most, refilled
/// continuously at `refill_tokens` per `refill_period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimits {
    capacity: u64,
    refill_tokens: u64,
    refill_period: Duration,
}

impl BucketLimits {
    pub fn new(capacity: u64, refill_tokens: u64, refill_period: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(RateLimitError::InvalidRate(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if refill_tokens == 0 {
            return Err(RateLimitError::InvalidRate(
                "refill_tokens must be greater than 0".to_string(),
            ));
        }
        if refill_period.is_zero() {
            return Err(RateLimitError::InvalidRate(
                "refill_period must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            refill_tokens,
            refill_period,
        })
    }

    /// `tokens` capacity, refilled at `tokens` per minute.
    pub fn per_minute(tokens: u64) -> Result<Self> {
        Self::new(tokens, tokens, Duration::from_secs(60))
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_tokens(&self) -> u64 {
        self.refill_tokens
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// Whole tokens accrued over `elapsed`.
    fn accrued(&self, elapsed: Duration) -> u64 {
        let tokens = elapsed.as_nanos() * u128::from(self.refill_tokens)
            / self.refill_period.as_nanos();
        u64::try_from(tokens).unwrap_or(u64::MAX)
    }

    /// Time that `tokens` whole tokens take to accrue, rounded down.
    fn accrual_time(&self, tokens: u64) -> Duration {
        let nanos =
            u128::from(tokens) * self.refill_period.as_nanos() / u128::from(self.refill_tokens);
        duration_from_nanos(nanos)
    }

    /// Shortest elapsed time after which `tokens` whole tokens have accrued.
    fn time_to_accrue(&self, tokens: u64) -> Duration {
        let refill = u128::from(self.refill_tokens);
        let nanos = (u128::from(tokens) * self.refill_period.as_nanos()).div_ceil(refill);
        duration_from_nanos(nanos)
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    match u64::try_from(nanos) {
        Ok(nanos) => Duration::from_nanos(nanos),
        Err(_) => Duration::MAX,
    }
}

/// Result of a consume attempt. Running out of tokens is a normal outcome,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionProbe {
    /// Whether the tokens were taken
    pub consumed: bool,

    /// Tokens left in the bucket after the attempt
    pub remaining: u64,

    /// Time until the requested tokens are available; zero when consumed.
    /// `Duration::MAX` when the request exceeds the bucket capacity.
    pub wait: Duration,
}

impl ConsumptionProbe {
    /// Wait time rounded up to whole seconds, so that retrying after this
    /// many seconds always finds the tokens available.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.wait)
    }
}

pub(crate) fn ceil_secs(wait: Duration) -> u64 {
    if wait.subsec_nanos() > 0 {
        wait.as_secs().saturating_add(1)
    } else {
        wait.as_secs()
    }
}

#[derive(Debug)]
struct BucketState {
    limits: BucketLimits,
    available: u64,
    last_refill: Duration,
}

impl BucketState {
    /// Credit whole tokens accrued since `last_refill`. The timestamp only
    /// moves by the time those whole tokens represent, so partial progress
    /// toward the next token is kept.
    fn refill(&mut self, now: Duration) {
        let capacity = self.limits.capacity;
        if self.available >= capacity {
            self.available = capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_sub(self.last_refill);
        let accrued = self.limits.accrued(elapsed);
        if accrued == 0 {
            return;
        }

        let missing = capacity - self.available;
        if accrued >= missing {
            self.available = capacity;
            self.last_refill = now;
        } else {
            self.available += accrued;
            self.last_refill += self.limits.accrual_time(accrued);
        }
    }

    /// Time until `tokens` are available. Call after `refill`.
    fn wait_for(&self, tokens: u64, now: Duration) -> Duration {
        if self.available >= tokens {
            return Duration::ZERO;
        }
        if tokens > self.limits.capacity {
            return Duration::MAX;
        }

        let deficit = tokens - self.available;
        let progress = now.saturating_sub(self.last_refill);
        self.limits.time_to_accrue(deficit).saturating_sub(progress)
    }
}

/// Token bucket with continuous refill.
///
/// A bucket starts full. Every operation first catches up on refill, then
/// answers under the bucket's lock, so concurrent callers never observe a
/// negative or over-capacity count.
#[derive(Debug)]
pub struct Bucket {
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl Bucket {
    /// Create a full bucket on the system clock
    pub fn new(limits: BucketLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock::new()))
    }

    /// Create a full bucket on a custom clock
    pub fn with_clock(limits: BucketLimits, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(BucketState {
                limits,
                available: limits.capacity,
                last_refill: now,
            }),
            clock,
        }
    }

    /// Try to take `tokens` tokens.
    ///
    /// On success the returned result carries the remaining count. On failure
    /// nothing is taken and the result carries the time until `tokens` will be
    /// available. Asking for zero tokens is a contract violation.
    pub fn try_consume(&self, tokens: u64) -> Result<ConsumptionProbe> {
        if tokens == 0 {
            return Err(RateLimitError::InvalidTokenCount(tokens));
        }
        Ok(self.consume(tokens))
    }

    /// Try to take a single token.
    pub fn try_consume_one(&self) -> ConsumptionProbe {
        self.consume(1)
    }

    fn consume(&self, tokens: u64) -> ConsumptionProbe {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.refill(now);

        if state.available >= tokens {
            state.available -= tokens;
            ConsumptionProbe {
                consumed: true,
                remaining: state.available,
                wait: Duration::ZERO,
            }
        } else {
            ConsumptionProbe {
                consumed: false,
                remaining: state.available,
                wait: state.wait_for(tokens, now),
            }
        }
    }

    /// Tokens available right now, without consuming any.
    pub fn available_tokens(&self) -> u64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.refill(now);
        state.available
    }

    /// Time until the next single token; zero if one is available now.
    pub fn time_until_next_token(&self) -> Duration {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.refill(now);
        state.wait_for(1, now)
    }

    pub fn limits(&self) -> BucketLimits {
        self.state.lock().limits
    }

    /// Resize the bucket to `limits`. Accrual under the old limits is
    /// settled first; the token count is then clamped to the new capacity.
    /// Returns `false` if the limits were already in effect.
    pub fn rebind(&self, limits: BucketLimits) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.limits == limits {
            return false;
        }

        state.refill(now);
        state.limits = limits;
        if state.available >= limits.capacity {
            state.available = limits.capacity;
            state.last_refill = now;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::clock::ManualClock;

    fn bucket(capacity: u64, per_minute: u64) -> (Bucket, ManualClock) {
        let clock = ManualClock::new();
        let limits = BucketLimits::new(capacity, per_minute, Duration::from_secs(60)).unwrap();
        (Bucket::with_clock(limits, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_invalid_limits_are_rejected() {
        assert!(BucketLimits::new(0, 5, Duration::from_secs(60)).is_err());
        assert!(BucketLimits::new(5, 0, Duration::from_secs(60)).is_err());
        assert!(BucketLimits::new(5, 5, Duration::ZERO).is_err());
        assert!(BucketLimits::per_minute(5).is_ok());
    }

    #[test]
    fn test_zero_token_consume_is_contract_violation() {
        let (bucket, _) = bucket(5, 5);
        assert!(matches!(
            bucket.try_consume(0),
            Err(RateLimitError::InvalidTokenCount(0))
        ));
        assert_eq!(bucket.available_tokens(), 5);
    }

    #[test]
    fn test_consume_up_to_capacity_from_fresh_bucket() {
        for n in 1..=5 {
            let (bucket, _) = bucket(5, 5);
            let outcome = bucket.try_consume(n).unwrap();
            assert!(outcome.consumed);
            assert_eq!(outcome.remaining, 5 - n);
            assert_eq!(bucket.available_tokens(), 5 - n);
        }
    }

    #[test]
    fn test_failed_consume_keeps_tokens() {
        let (bucket, clock) = bucket(5, 5);
        for _ in 0..5 {
            assert!(bucket.try_consume_one().consumed);
        }

        let outcome = bucket.try_consume_one();
        assert!(!outcome.consumed);
        assert_eq!(outcome.remaining, 0);
        assert_eq!(outcome.wait, Duration::from_secs(12));

        // One token's worth of time restores exactly one token.
        clock.advance(Duration::from_secs(12));
        let outcome = bucket.try_consume_one();
        assert!(outcome.consumed);
        assert_eq!(outcome.remaining, 0);
        assert!(!bucket.try_consume_one().consumed);
    }

    #[test]
    fn test_partial_request_denied_without_mutation() {
        let (bucket, _) = bucket(5, 5);
        bucket.try_consume(3).unwrap();

        let outcome = bucket.try_consume(4).unwrap();
        assert!(!outcome.consumed);
        assert_eq!(outcome.remaining, 2);
        assert_eq!(outcome.wait, Duration::from_secs(24));
        assert_eq!(bucket.available_tokens(), 2);
    }

    #[test]
    fn test_request_above_capacity_never_fits() {
        let (bucket, _) = bucket(5, 5);
        let outcome = bucket.try_consume(6).unwrap();
        assert!(!outcome.consumed);
        assert_eq!(outcome.wait, Duration::MAX);
        assert_eq!(outcome.retry_after_secs(), u64::MAX);
    }

    #[test]
    fn test_fractional_progress_is_kept() {
        let (bucket, clock) = bucket(5, 5);
        bucket.try_consume(5).unwrap();

        // Many short polls must not discard progress toward the next token.
        for _ in 0..11 {
            clock.advance(Duration::from_secs(1));
            assert_eq!(bucket.available_tokens(), 0);
        }
        clock.advance(Duration::from_secs(1));
        assert_eq!(bucket.available_tokens(), 1);
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let (bucket, clock) = bucket(5, 5);
        bucket.try_consume(2).unwrap();
        clock.advance(Duration::from_secs(3600));
        assert_eq!(bucket.available_tokens(), 5);
    }

    #[test]
    fn test_refill_is_monotone() {
        let (bucket, clock) = bucket(20, 20);
        bucket.try_consume(20).unwrap();

        let mut previous = bucket.available_tokens();
        for _ in 0..30 {
            clock.advance(Duration::from_millis(1700));
            let current = bucket.available_tokens();
            assert!(current >= previous);
            assert!(current <= 20);
            previous = current;
        }
        assert_eq!(previous, 17);
    }

    #[test]
    fn test_time_until_next_token() {
        let (bucket, clock) = bucket(5, 5);
        assert_eq!(bucket.time_until_next_token(), Duration::ZERO);

        bucket.try_consume(5).unwrap();
        assert_eq!(bucket.time_until_next_token(), Duration::from_secs(12));

        clock.advance(Duration::from_millis(4500));
        assert_eq!(bucket.time_until_next_token(), Duration::from_millis(7500));
        assert_eq!(ceil_secs(bucket.time_until_next_token()), 8);

        // Probing is read-only.
        assert_eq!(bucket.available_tokens(), 0);
        clock.advance(Duration::from_millis(7500));
        assert_eq!(bucket.time_until_next_token(), Duration::ZERO);
        assert_eq!(bucket.available_tokens(), 1);
    }

    #[test]
    fn test_rebind_clamps_and_never_tops_up() {
        let (bucket, clock) = bucket(20, 20);
        bucket.try_consume(17).unwrap();

        let standard = BucketLimits::per_minute(5).unwrap();
        assert!(bucket.rebind(standard));
        assert!(!bucket.rebind(standard));
        assert_eq!(bucket.available_tokens(), 3);

        bucket.try_consume(3).unwrap();
        let premium = BucketLimits::per_minute(20).unwrap();
        assert!(bucket.rebind(premium));
        assert_eq!(bucket.available_tokens(), 0);
        assert_eq!(bucket.limits().capacity(), 20);

        clock.advance(Duration::from_secs(3));
        assert_eq!(bucket.available_tokens(), 1);

        // Shrinking a full bucket clamps to the new capacity.
        clock.advance(Duration::from_secs(600));
        assert!(bucket.rebind(standard));
        assert_eq!(bucket.available_tokens(), 5);
    }

    #[test]
    fn test_concurrent_consume_never_overdraws() {
        let (bucket, _) = bucket(100, 1);
        let admitted = std::sync::atomic::AtomicU64::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        if bucket.try_consume_one().consumed {
                            admitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.into_inner(), 100);
        assert_eq!(bucket.available_tokens(), 0);
    }
}
