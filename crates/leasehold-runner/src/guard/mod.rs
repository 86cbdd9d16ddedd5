//! Process-level guardrails that make a runner exit for a clean respawn.
//!
//! ## Overview
//!
//! Long-lived worker loops slowly accumulate memory and descriptors. Rather than trying to
//! reclaim them, the runner exits after a number of cycles or once resident memory crosses a
//! limit, and leaves the restart to the process supervisor.
//! - On **Linux** resident memory is read from `/proc/self/statm` (pages × page size).
//! - On **other Unix platforms** the peak resident size from `getrusage` is used.
//! - Elsewhere no reading is available and the memory guardrail never trips.

/// Source of the current resident memory of this process.
pub trait MemoryProbe: Send + Sync + 'static {
    /// Resident set size in bytes, or `None` if it cannot be determined.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads memory usage of the current OS process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    fn resident_bytes(&self) -> Option<u64> {
        platform::resident_bytes()
    }
}

/// Decide whether `used` bytes trip a configured limit.
#[inline]
pub fn over_limit(used: Option<u64>, limit: Option<u64>) -> bool {
    matches!((used, limit), (Some(used), Some(limit)) if used >= limit)
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs;

    pub fn resident_bytes() -> Option<u64> {
        let statm = fs::read_to_string("/proc/self/statm").ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return None;
        }
        Some(pages.saturating_mul(page_size as u64))
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod platform {
    pub fn resident_bytes() -> Option<u64> {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if rc != 0 {
            return None;
        }
        let max_rss = usage.ru_maxrss as u64;
        // macOS reports bytes, the BSDs report KiB.
        if cfg!(target_os = "macos") {
            Some(max_rss)
        } else {
            Some(max_rss.saturating_mul(1024))
        }
    }
}

#[cfg(not(unix))]
mod platform {
    pub fn resident_bytes() -> Option<u64> {
        None
    }
}
