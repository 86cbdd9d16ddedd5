//! Shared cache contract used as the only synchronization medium between processes.
//!
//! Every coordination primitive in `leasehold` is expressed through the [`Cache`] trait:
//! - `set_if_absent` is the lease-acquire primitive and must be atomic on the backend;
//! - `get`/`set`/`delete`/`increment` back the rate limiter counters and timers.
//!
//! Backends:
//! - [`MemoryCache`]: in-process map with TTLs driven by a [`Clock`] (tests, single-host setups);
//! - `RedisCache` (feature `redis`): `SET NX PX` / `INCR` / `DEL` over a managed connection.

mod clock;
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};

mod error;
pub use error::CacheError;

mod memory;
pub use memory::MemoryCache;

#[cfg(feature = "redis")]
mod redis_cache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

/// Key-value cache with per-key expiry.
///
/// Keys and values are plain strings. Implementations must execute each call atomically;
/// a backend without an atomic `set_if_absent` breaks the lease mutual-exclusion guarantee.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Return the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Store `value` under `key` only if no live value exists.
    ///
    /// Returns `true` when the write applied.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, CacheError>;

    /// Remove `key`. Returns `true` if a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Atomically add one to the integer stored under `key` and return the new value.
    ///
    /// An absent key is created with value `1` and no expiry; an existing key keeps its expiry.
    async fn increment(&self, key: &str) -> Result<i64, CacheError>;

    /// Like [`Cache::increment`], but a key left without an expiry afterwards (new, or
    /// recreated by a plain `increment`) is given `ttl` in the same atomic step.
    async fn increment_within(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;

    /// Whether a live value exists under `key`.
    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[inline]
pub(crate) fn check_ttl(key: &str, ttl: Duration) -> Result<(), CacheError> {
    if ttl.is_zero() {
        return Err(invalid_ttl(key));
    }
    Ok(())
}

/// `now + ttl`, rejecting zero TTLs and TTLs past the representable date range.
pub(crate) fn deadline(
    key: &str,
    now: OffsetDateTime,
    ttl: Duration,
) -> Result<OffsetDateTime, CacheError> {
    check_ttl(key, ttl)?;
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|d| now.checked_add(d))
        .ok_or_else(|| invalid_ttl(key))
}

#[inline]
fn invalid_ttl(key: &str) -> CacheError {
    CacheError::InvalidTtl {
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_rejects_zero_and_out_of_range_ttls() {
        let now = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(
            deadline("k", now, Duration::from_secs(60)).unwrap(),
            now + Duration::from_secs(60)
        );
        assert!(matches!(
            deadline("k", now, Duration::ZERO),
            Err(CacheError::InvalidTtl { .. })
        ));
        assert!(matches!(
            deadline("k", now, Duration::from_secs(u64::MAX)),
            Err(CacheError::InvalidTtl { .. })
        ));
    }
}
