//! Conversions between delays, deadlines and UNIX timestamps.

use std::time::Duration;

use leasehold_cache::Clock;
use time::OffsetDateTime;

/// A delay expressed either relative to now or as an absolute deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    Seconds(u64),
    Interval(Duration),
    At(OffsetDateTime),
}

impl From<u64> for Delay {
    fn from(secs: u64) -> Self {
        Delay::Seconds(secs)
    }
}

impl From<Duration> for Delay {
    fn from(d: Duration) -> Self {
        Delay::Interval(d)
    }
}

impl From<OffsetDateTime> for Delay {
    fn from(at: OffsetDateTime) -> Self {
        Delay::At(at)
    }
}

/// Current time as UNIX seconds.
#[inline]
pub fn current_time(clock: &dyn Clock) -> i64 {
    clock.unix_timestamp()
}

/// Number of seconds until `delay` elapses; deadlines in the past yield zero.
pub fn seconds_until(clock: &dyn Clock, delay: impl Into<Delay>) -> u64 {
    match delay.into() {
        Delay::Seconds(secs) => secs,
        Delay::Interval(d) => d.as_secs(),
        Delay::At(at) => (at.unix_timestamp() - current_time(clock)).max(0) as u64,
    }
}

/// UNIX timestamp at which `delay` elapses.
pub fn available_at(clock: &dyn Clock, delay: impl Into<Delay>) -> i64 {
    match delay.into() {
        Delay::Seconds(secs) => current_time(clock).saturating_add_unsigned(secs),
        Delay::Interval(d) => current_time(clock).saturating_add_unsigned(d.as_secs()),
        Delay::At(at) => at.unix_timestamp(),
    }
}
