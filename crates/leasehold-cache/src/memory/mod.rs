use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::trace;

use crate::{Cache, CacheError, Clock, SystemClock, deadline};

/// Mutations between two sweeps of expired entries.
pub const DEFAULT_SWEEP_EVERY: u64 = 1024;

/// In-process cache with per-key expiry.
///
/// All mutations happen under one write lock, which makes `set_if_absent` and `increment`
/// atomic for every caller sharing the same instance (e.g. several runners in one process,
/// or simulated processes in tests). Expired entries read as absent; they are dropped when
/// their key is rewritten and by a sweep that runs every `sweep_every` mutations.
pub struct MemoryCache {
    inner: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
    sweep_every: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` means the entry never expires.
    expires_at: Option<OffsetDateTime>,
}

impl Entry {
    #[inline]
    fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn bump(&mut self, key: &str) -> Result<i64, CacheError> {
        let not_an_integer = || CacheError::NotAnInteger {
            key: key.to_string(),
        };
        let current: i64 = self.value.trim().parse().map_err(|_| not_an_integer())?;
        let next = current.checked_add(1).ok_or_else(not_an_integer)?;
        self.value = next.to_string();
        Ok(next)
    }
}

type Map = HashMap<String, Entry>;

impl MemoryCache {
    /// Cache driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Cache whose expiry is evaluated against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            clock,
            writes: AtomicU64::new(0),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }

    /// Sweep expired entries every `writes` mutations. Zero turns the sweep off.
    pub fn with_sweep_every(mut self, writes: u64) -> Self {
        self.sweep_every = writes;
        self
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        purge(&mut inner, now)
    }

    /// Entries held in memory, expired ones included.
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lock(&self) -> std::sync::RwLockWriteGuard<'_, Map> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one mutation and sweep when the counter comes round.
    fn after_write(&self, inner: &mut Map, now: OffsetDateTime) {
        if self.sweep_every == 0 {
            return;
        }
        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.sweep_every == 0 {
            purge(inner, now);
        }
    }
}

fn purge(inner: &mut Map, now: OffsetDateTime) -> usize {
    let before = inner.len();
    inner.retain(|_, e| e.is_live(now));
    let purged = before - inner.len();
    if purged > 0 {
        trace!(purged, "expired cache entries purged");
    }
    purged
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        Ok(inner
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: Some(deadline(key, now, ttl)?),
        };

        let mut inner = self.lock();
        inner.insert(key.to_string(), entry);
        self.after_write(&mut inner, now);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let expires_at = deadline(key, now, ttl)?;

        let mut inner = self.lock();
        if inner.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        inner.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        self.after_write(&mut inner, now);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let removed = inner.remove(key).is_some_and(|e| e.is_live(now));
        self.after_write(&mut inner, now);
        Ok(removed)
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let hits = match inner.get_mut(key) {
            Some(entry) if entry.is_live(now) => entry.bump(key)?,
            _ => {
                inner.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                1
            }
        };
        self.after_write(&mut inner, now);
        Ok(hits)
    }

    async fn increment_within(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = self.clock.now();
        let expires_at = deadline(key, now, ttl)?;
        let mut inner = self.lock();

        let hits = match inner.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let hits = entry.bump(key)?;
                entry.expires_at.get_or_insert(expires_at);
                hits
            }
            _ => {
                inner.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: Some(expires_at),
                    },
                );
                1
            }
        };
        self.after_write(&mut inner, now);
        Ok(hits)
    }
}
