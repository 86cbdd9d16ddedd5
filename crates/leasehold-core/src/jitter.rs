use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Randomised backoff used to spread contending processes apart.
///
/// For an interval of `n` seconds the sleep is drawn uniformly from `[n/2, n]` with a
/// resolution of 1/100 s and then rounded to whole seconds.
#[derive(Debug)]
pub struct Jitter {
    rng: Mutex<StdRng>,
}

impl Jitter {
    /// Jitter seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic jitter for tests and simulations.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Inclusive bounds of [`Jitter::sleep_time`] for `interval_secs`.
    pub fn bounds(interval_secs: i64) -> (Duration, Duration) {
        if interval_secs <= 0 {
            return (Duration::ZERO, Duration::ZERO);
        }
        let (lo, hi) = centi_range(interval_secs);
        (round_centis(lo), round_centis(hi))
    }

    /// Draw one backoff duration for `interval_secs`. Non-positive intervals yield zero.
    pub fn sleep_time(&self, interval_secs: i64) -> Duration {
        if interval_secs <= 0 {
            return Duration::ZERO;
        }
        let (lo, hi) = centi_range(interval_secs);
        let centis = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(lo..=hi)
        };
        round_centis(centis)
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn centi_range(interval_secs: i64) -> (u64, u64) {
    let hi = (interval_secs as u64).saturating_mul(100);
    (hi / 2, hi)
}

#[inline]
fn round_centis(centis: u64) -> Duration {
    Duration::from_secs(centis.saturating_add(50) / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_time_stays_within_half_to_full_interval() {
        let jitter = Jitter::seeded(7);
        for _ in 0..500 {
            let d = jitter.sleep_time(10);
            assert!(d >= Duration::from_secs(5), "{d:?} below range");
            assert!(d <= Duration::from_secs(10), "{d:?} above range");
        }
    }

    #[test]
    fn sleep_time_rounds_odd_intervals() {
        // [1.5, 3] s rounds to 2 or 3 s.
        let jitter = Jitter::seeded(1);
        for _ in 0..200 {
            let secs = jitter.sleep_time(3).as_secs();
            assert!((2..=3).contains(&secs));
        }
        assert_eq!(
            Jitter::bounds(3),
            (Duration::from_secs(2), Duration::from_secs(3))
        );
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let a = Jitter::seeded(42);
        let b = Jitter::seeded(42);
        let xs: Vec<_> = (0..20).map(|_| a.sleep_time(60)).collect();
        let ys: Vec<_> = (0..20).map(|_| b.sleep_time(60)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn non_positive_interval_means_no_sleep() {
        let jitter = Jitter::seeded(3);
        assert_eq!(jitter.sleep_time(0), Duration::ZERO);
        assert_eq!(jitter.sleep_time(-5), Duration::ZERO);
        assert_eq!(Jitter::bounds(-1), (Duration::ZERO, Duration::ZERO));
    }

    #[test]
    fn huge_interval_saturates() {
        let (lo, hi) = Jitter::bounds(i64::MAX);
        assert!(lo <= hi);
        let d = Jitter::seeded(5).sleep_time(i64::MAX);
        assert!(d >= lo && d <= hi);
    }
}
