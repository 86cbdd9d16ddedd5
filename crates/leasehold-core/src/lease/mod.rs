//! TTL-bound ownership tokens backed by a single cache key.
//!
//! ## Overview
//!
//! A [`Lease`] is held by whoever managed to create its cache key:
//! - `acquire` is one atomic `set_if_absent` with the lease TTL. It never blocks and never retries;
//! - `release` deletes the key unconditionally and is safe to call without holding the lease;
//! - there is no renewal. Work done under a lease must finish within its TTL.
//!
//! If the holder dies before releasing, the key expires on its own after the TTL and another
//! process can take over.
use std::sync::Arc;

use leasehold_cache::{Cache, CacheError, Clock, SystemClock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{delay::available_at, system::new_holder_id};

/// Diagnostic payload stored as the value of a lease key.
///
/// Ownership is decided by the key's existence alone; the marker only tells operators who holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseMarker {
    pub holder: String,
    /// UNIX seconds.
    pub acquired_at: i64,
    /// UNIX seconds.
    pub expires_at: i64,
}

/// A named lease in a shared cache.
pub struct Lease<C: Cache + ?Sized> {
    cache: Arc<C>,
    clock: Arc<dyn Clock>,
    name: String,
    ttl_seconds: u64,
    holder: String,
}

// Arc<C> clones regardless of C.
impl<C: Cache + ?Sized> Clone for Lease<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            clock: Arc::clone(&self.clock),
            name: self.name.clone(),
            ttl_seconds: self.ttl_seconds,
            holder: self.holder.clone(),
        }
    }
}

impl<C: Cache + ?Sized> Lease<C> {
    /// Create a lease handle. A zero TTL is raised to one second.
    pub fn new(cache: Arc<C>, name: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            cache,
            clock: Arc::new(SystemClock),
            name: name.into(),
            ttl_seconds: ttl_seconds.max(1),
            holder: new_holder_id(),
        }
    }

    /// Use `clock` for the timestamps written into the marker.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Holder id written by this handle.
    #[inline]
    pub fn holder_id(&self) -> &str {
        &self.holder
    }

    /// Try once to take the lease. `Ok(false)` means someone else holds it.
    pub async fn acquire(&self) -> Result<bool, CacheError> {
        let marker = LeaseMarker {
            holder: self.holder.clone(),
            acquired_at: self.clock.unix_timestamp(),
            expires_at: available_at(self.clock.as_ref(), self.ttl_seconds),
        };
        let value =
            serde_json::to_string(&marker).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let acquired = self
            .cache
            .set_if_absent(&self.name, &value, self.ttl())
            .await?;

        if acquired {
            debug!(lease = %self.name, ttl_secs = self.ttl_seconds, "lease acquired");
        } else {
            trace!(lease = %self.name, "lease held elsewhere");
        }
        Ok(acquired)
    }

    /// Drop the lease key. Returns `true` if a key was deleted.
    pub async fn release(&self) -> Result<bool, CacheError> {
        let removed = self.cache.delete(&self.name).await?;
        trace!(lease = %self.name, removed, "lease released");
        Ok(removed)
    }

    /// Marker of the current holder, if the lease is held and its value is readable.
    pub async fn holder(&self) -> Result<Option<LeaseMarker>, CacheError> {
        let raw = self.cache.get(&self.name).await?;
        Ok(raw.and_then(|v| serde_json::from_str(&v).ok()))
    }

    #[inline]
    fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_seconds)
    }
}
