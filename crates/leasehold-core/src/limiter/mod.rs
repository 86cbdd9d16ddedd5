//! Fixed-window attempt counter with a separate lockout timer.
//!
//! Each limited `key` owns two cache entries:
//! - `key` holds the attempt counter and expires with the decay window;
//! - `key:timer` holds the UNIX time at which the lockout ends and carries its own expiry.
//!
//! The timer is what callers are blocked on. Resetting the counter leaves an active lockout in
//! place, and a counter that outlives its timer is treated as stale and reset on the next check.
mod error;
pub use error::LimiterError;

use std::{sync::Arc, time::Duration};

use leasehold_cache::{Cache, Clock, SystemClock};
use tracing::{debug, instrument, trace};

use crate::delay::{available_at, current_time};

/// Default decay window for [`RateLimiter::hit`].
pub const DEFAULT_DECAY_SECONDS: u64 = 60;

const TIMER_SUFFIX: &str = ":timer";

pub struct RateLimiter<C: Cache + ?Sized> {
    cache: Arc<C>,
    clock: Arc<dyn Clock>,
}

impl<C: Cache + ?Sized> Clone for RateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Cache + ?Sized> RateLimiter<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self::with_clock(cache, Arc::new(SystemClock))
    }

    pub fn with_clock(cache: Arc<C>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    /// Whether `key` is currently locked out.
    ///
    /// Requires both `attempts >= max_attempts` and a live lockout timer. A counter at the
    /// threshold without a timer is stale: it is reset and the key is reported as open.
    #[instrument(level = "trace", skip(self))]
    pub async fn too_many_attempts(
        &self,
        key: &str,
        max_attempts: u64,
    ) -> Result<bool, LimiterError> {
        if self.attempts(key).await? >= clamp_max(max_attempts) {
            if self.cache.has(&timer_key(key)).await? {
                return Ok(true);
            }
            debug!(key, "stale attempt counter without lockout timer; resetting");
            self.reset_attempts(key).await?;
        }
        Ok(false)
    }

    /// Record one attempt for `key` and return the attempt count.
    ///
    /// Refreshes the lockout timer to `now + decay_seconds`, then atomically increments the
    /// counter. A counter without an expiry (new, or recreated after its window lapsed) gets
    /// `decay_seconds` in the same step, so concurrent hits never leave an immortal counter.
    #[instrument(level = "trace", skip(self))]
    pub async fn hit(&self, key: &str, decay_seconds: u64) -> Result<i64, LimiterError> {
        let decay = Duration::from_secs(decay_seconds);
        let timer = timer_key(key);

        let until = available_at(self.clock.as_ref(), decay_seconds);
        self.cache.set(&timer, &until.to_string(), decay).await?;

        let hits = self.cache.increment_within(key, decay).await?;

        trace!(key, hits, lockout_until = until, "attempt recorded");
        Ok(hits)
    }

    /// Attempts recorded in the current window (0 when none).
    pub async fn attempts(&self, key: &str) -> Result<i64, LimiterError> {
        self.read_int(key).await.map(|v| v.unwrap_or(0))
    }

    /// Drop the attempt counter. The lockout timer is left untouched.
    pub async fn reset_attempts(&self, key: &str) -> Result<bool, LimiterError> {
        Ok(self.cache.delete(key).await?)
    }

    /// `max_attempts - attempts`; negative once the key is over its limit.
    pub async fn retries_left(&self, key: &str, max_attempts: u64) -> Result<i64, LimiterError> {
        let attempts = self.attempts(key).await?;
        Ok(clamp_max(max_attempts).saturating_sub(attempts))
    }

    /// Drop both the counter and the lockout timer.
    pub async fn clear(&self, key: &str) -> Result<(), LimiterError> {
        self.reset_attempts(key).await?;
        self.cache.delete(&timer_key(key)).await?;
        Ok(())
    }

    /// Seconds until the lockout timer ends.
    ///
    /// Zero when no timer exists; may be negative when the timer has passed but the backend
    /// has not evicted it yet.
    pub async fn available_in(&self, key: &str) -> Result<i64, LimiterError> {
        match self.read_int(&timer_key(key)).await? {
            Some(until) => Ok(until.saturating_sub(current_time(self.clock.as_ref()))),
            None => Ok(0),
        }
    }

    /// Check and record in one call: `Ok(false)` when `key` is locked out, otherwise records
    /// a hit and returns `Ok(true)`.
    pub async fn attempt(
        &self,
        key: &str,
        max_attempts: u64,
        decay_seconds: u64,
    ) -> Result<bool, LimiterError> {
        if self.too_many_attempts(key, max_attempts).await? {
            return Ok(false);
        }
        self.hit(key, decay_seconds).await?;
        Ok(true)
    }

    async fn read_int(&self, key: &str) -> Result<Option<i64>, LimiterError> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(None);
        };
        raw.trim()
            .parse()
            .map(Some)
            .map_err(|_| LimiterError::Corrupt {
                key: key.to_string(),
                value: raw,
            })
    }
}

/// Attempt limits beyond `i64::MAX` cannot be reached by a counter anyway.
#[inline]
fn clamp_max(max_attempts: u64) -> i64 {
    i64::try_from(max_attempts).unwrap_or(i64::MAX)
}

#[inline]
fn timer_key(key: &str) -> String {
    format!("{key}{TIMER_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use leasehold_cache::{CacheError, ManualClock, MemoryCache};

    use super::*;

    fn setup() -> (Arc<ManualClock>, Arc<MemoryCache>, RateLimiter<MemoryCache>) {
        let clock = Arc::new(ManualClock::deterministic());
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let limiter = RateLimiter::with_clock(Arc::clone(&cache), clock.clone());
        (clock, cache, limiter)
    }

    #[tokio::test]
    async fn hit_counts_attempts_within_window() {
        let (_clock, _cache, limiter) = setup();

        assert_eq!(limiter.hit("login:alice", 60).await.unwrap(), 1);
        assert_eq!(limiter.hit("login:alice", 60).await.unwrap(), 2);
        assert_eq!(limiter.hit("login:alice", 60).await.unwrap(), 3);
        assert_eq!(limiter.attempts("login:alice").await.unwrap(), 3);
        assert_eq!(limiter.attempts("login:bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn locked_until_timer_expires() {
        let (clock, _cache, limiter) = setup();

        limiter.hit("k", 60).await.unwrap();
        assert!(limiter.too_many_attempts("k", 1).await.unwrap());

        clock.advance(Duration::from_secs(59));
        assert!(limiter.too_many_attempts("k", 1).await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(!limiter.too_many_attempts("k", 1).await.unwrap());
    }

    #[tokio::test]
    async fn below_threshold_is_not_limited() {
        let (_clock, _cache, limiter) = setup();
        limiter.hit("k", 60).await.unwrap();
        limiter.hit("k", 60).await.unwrap();

        assert!(!limiter.too_many_attempts("k", 3).await.unwrap());
        assert_eq!(limiter.retries_left("k", 3).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reset_attempts_keeps_lockout_timer() {
        let (_clock, cache, limiter) = setup();
        limiter.hit("k", 60).await.unwrap();

        assert!(limiter.reset_attempts("k").await.unwrap());
        assert_eq!(limiter.attempts("k").await.unwrap(), 0);
        assert!(cache.has("k:timer").await.unwrap());
        assert!(limiter.available_in("k").await.unwrap() > 0);

        // Timer still live; the next hit puts the key straight back over the limit.
        limiter.hit("k", 60).await.unwrap();
        assert!(limiter.too_many_attempts("k", 1).await.unwrap());
    }

    #[tokio::test]
    async fn stale_counter_without_timer_is_reset() {
        let (_clock, cache, limiter) = setup();
        cache.set("k", "5", Duration::from_secs(600)).await.unwrap();

        assert!(!limiter.too_many_attempts("k", 3).await.unwrap());
        assert_eq!(limiter.attempts("k").await.unwrap(), 0);
        assert!(!cache.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn clear_removes_counter_and_timer() {
        let (_clock, cache, limiter) = setup();
        limiter.hit("k", 60).await.unwrap();

        limiter.clear("k").await.unwrap();
        assert!(!cache.has("k").await.unwrap());
        assert!(!cache.has("k:timer").await.unwrap());
        assert!(!limiter.too_many_attempts("k", 1).await.unwrap());
        assert_eq!(limiter.available_in("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn available_in_counts_down() {
        let (clock, _cache, limiter) = setup();
        limiter.hit("k", 60).await.unwrap();

        let mut last = limiter.available_in("k").await.unwrap();
        assert!((59..=60).contains(&last), "got {last}");

        for _ in 0..5 {
            clock.advance(Duration::from_secs(7));
            let now = limiter.available_in("k").await.unwrap();
            assert!(now < last);
            last = now;
        }
        assert_eq!(last, 25);
    }

    #[tokio::test]
    async fn retries_left_goes_negative_over_limit() {
        let (_clock, _cache, limiter) = setup();
        for _ in 0..4 {
            limiter.hit("k", 60).await.unwrap();
        }
        assert_eq!(limiter.retries_left("k", 2).await.unwrap(), -2);
    }

    #[tokio::test]
    async fn counter_window_restarts_after_decay() {
        let (clock, _cache, limiter) = setup();
        limiter.hit("k", 10).await.unwrap();
        limiter.hit("k", 10).await.unwrap();

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.attempts("k").await.unwrap(), 0);
        assert_eq!(limiter.hit("k", 10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn counter_without_expiry_gets_the_decay_window() {
        let (clock, cache, limiter) = setup();
        // Two callers recreated the counter with plain increments after its window lapsed.
        cache.increment("k").await.unwrap();
        cache.increment("k").await.unwrap();

        assert_eq!(limiter.hit("k", 10).await.unwrap(), 3);

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.attempts("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counter_recreated_after_reset_still_expires() {
        let (clock, _cache, limiter) = setup();
        limiter.hit("k", 10).await.unwrap();
        limiter.reset_attempts("k").await.unwrap();

        assert_eq!(limiter.hit("k", 10).await.unwrap(), 1);
        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.attempts("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn limits_beyond_i64_never_lock() {
        let (_clock, _cache, limiter) = setup();
        limiter.hit("k", 60).await.unwrap();

        assert!(!limiter.too_many_attempts("k", u64::MAX).await.unwrap());
        assert_eq!(
            limiter.retries_left("k", u64::MAX).await.unwrap(),
            i64::MAX - 1
        );
        assert!(limiter.attempt("k", u64::MAX, 60).await.unwrap());
    }

    #[tokio::test]
    async fn oversized_decay_is_an_error_not_a_panic() {
        let (_clock, cache, limiter) = setup();
        let err = limiter.hit("k", u64::MAX).await.unwrap_err();

        assert!(matches!(
            err,
            LimiterError::Backend(CacheError::InvalidTtl { .. })
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn attempt_blocks_once_limit_is_reached() {
        let (_clock, _cache, limiter) = setup();
        assert!(limiter.attempt("k", 2, 60).await.unwrap());
        assert!(limiter.attempt("k", 2, 60).await.unwrap());
        assert!(!limiter.attempt("k", 2, 60).await.unwrap());
        assert_eq!(limiter.attempts("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn corrupt_counter_is_reported() {
        let (_clock, cache, limiter) = setup();
        cache.set("k", "lots", Duration::from_secs(60)).await.unwrap();

        let err = limiter.attempts("k").await.unwrap_err();
        assert!(matches!(err, LimiterError::Corrupt { ref key, .. } if key == "k"));
    }

    #[tokio::test]
    async fn zero_decay_surfaces_as_backend_error() {
        let (_clock, _cache, limiter) = setup();
        let err = limiter.hit("k", 0).await.unwrap_err();
        assert!(matches!(
            err,
            LimiterError::Backend(CacheError::InvalidTtl { .. })
        ));
    }
}
