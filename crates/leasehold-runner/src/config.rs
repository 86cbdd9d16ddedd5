use std::{str::FromStr, time::Duration};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How long a misconfigured runner idles before returning.
pub const DEFAULT_MISCONFIGURED_IDLE: Duration = Duration::from_secs(3600);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid memory size: {0} (expected e.g. 536870912, 512K, 256M, 1G)")]
    InvalidMemorySize(String),
}

/// Per-runner policy.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Exit after this many executed cycles. `None` = unbounded.
    pub run_limit: Option<u64>,
    /// Exit once resident memory reaches this many bytes. `None` = unbounded.
    pub memory_limit_bytes: Option<u64>,
    /// Back off after a failed task before releasing the lease, instead of retrying at once.
    pub exception_sleep: bool,
    /// Idle period before a runner with a non-positive interval returns.
    pub misconfigured_idle: Duration,
    /// Checked at every loop boundary and raced against every sleep.
    pub cancel: CancellationToken,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run_limit: None,
            memory_limit_bytes: None,
            exception_sleep: true,
            misconfigured_idle: DEFAULT_MISCONFIGURED_IDLE,
            cancel: CancellationToken::new(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limit of zero means unbounded.
    pub fn with_run_limit(mut self, runs: u64) -> Self {
        self.run_limit = (runs > 0).then_some(runs);
        self
    }

    /// A limit of zero means unbounded.
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = (bytes > 0).then_some(bytes);
        self
    }

    pub fn with_exception_sleep(mut self, enabled: bool) -> Self {
        self.exception_sleep = enabled;
        self
    }

    pub fn with_misconfigured_idle(mut self, idle: Duration) -> Self {
        self.misconfigured_idle = idle;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Memory size in bytes parsed from `"1048576"`, `"512K"`, `"256M"`, `"1G"` (binary units).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySize(pub u64);

impl FromStr for MemorySize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase();
        let invalid = || ConfigError::InvalidMemorySize(s.to_string());

        let digits = norm.trim_end_matches(['B', 'I']);
        let (number, shift) = match digits.chars().last() {
            Some('K') => (&digits[..digits.len() - 1], 10),
            Some('M') => (&digits[..digits.len() - 1], 20),
            Some('G') => (&digits[..digits.len() - 1], 30),
            Some(c) if c.is_ascii_digit() => (digits, 0),
            _ => return Err(invalid()),
        };

        let value: u64 = number.trim().parse().map_err(|_| invalid())?;
        value
            .checked_mul(1u64 << shift)
            .map(MemorySize)
            .ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unbounded_with_exception_sleep() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.run_limit, None);
        assert_eq!(cfg.memory_limit_bytes, None);
        assert!(cfg.exception_sleep);
        assert_eq!(cfg.misconfigured_idle, Duration::from_secs(3600));
        assert!(!cfg.cancel.is_cancelled());
    }

    #[test]
    fn zero_limits_mean_unbounded() {
        let cfg = RunnerConfig::new().with_run_limit(0).with_memory_limit(0);
        assert_eq!(cfg.run_limit, None);
        assert_eq!(cfg.memory_limit_bytes, None);

        let cfg = cfg.with_run_limit(500).with_memory_limit(1024);
        assert_eq!(cfg.run_limit, Some(500));
        assert_eq!(cfg.memory_limit_bytes, Some(1024));
    }

    #[test]
    fn memory_size_parses_units() {
        assert_eq!("1048576".parse::<MemorySize>(), Ok(MemorySize(1 << 20)));
        assert_eq!("512K".parse::<MemorySize>(), Ok(MemorySize(512 << 10)));
        assert_eq!(" 256m ".parse::<MemorySize>(), Ok(MemorySize(256 << 20)));
        assert_eq!("1G".parse::<MemorySize>(), Ok(MemorySize(1 << 30)));
        assert_eq!("2MiB".parse::<MemorySize>(), Ok(MemorySize(2 << 20)));
        assert_eq!("64MB".parse::<MemorySize>(), Ok(MemorySize(64 << 20)));
    }

    #[test]
    fn memory_size_rejects_garbage() {
        for bad in ["", "M", "12X", "abc", "-5M"] {
            assert!(
                matches!(bad.parse::<MemorySize>(), Err(ConfigError::InvalidMemorySize(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
