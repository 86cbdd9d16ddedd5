use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use time::OffsetDateTime;

/// Source of wall-clock time for expiry and lockout bookkeeping.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;

    /// Current time as UNIX seconds.
    #[inline]
    fn unix_timestamp(&self) -> i64 {
        self.now().unix_timestamp()
    }
}

/// Real system clock (UTC).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: OffsetDateTime,
    elapsed_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(base: OffsetDateTime) -> Self {
        Self {
            base,
            elapsed_ms: AtomicU64::new(0),
        }
    }

    /// Clock anchored at a fixed instant (2023-11-14T22:13:20Z).
    pub fn deterministic() -> Self {
        Self::new(OffsetDateTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed_ms
            .fetch_add(by.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::Relaxed))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        self.base + self.elapsed()
    }
}

/// Wall clock derived from the tokio timer.
///
/// Anchored to the system time at construction and advanced by `tokio::time::Instant`,
/// so a paused runtime (`start_paused = true`) moves it together with `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct TokioClock {
    base: OffsetDateTime,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored(OffsetDateTime::now_utc())
    }

    pub fn anchored(base: OffsetDateTime) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        self.base + self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_advance() {
        let clock = ManualClock::deterministic();
        let start = clock.unix_timestamp();
        assert_eq!(start, 1_700_000_000);
        assert_eq!(clock.unix_timestamp(), start);

        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.unix_timestamp(), start + 61);
        assert_eq!(clock.elapsed(), Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::anchored(OffsetDateTime::UNIX_EPOCH);
        assert_eq!(clock.unix_timestamp(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(clock.unix_timestamp(), 30);
    }
}
