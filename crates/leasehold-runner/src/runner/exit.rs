use std::fmt;

/// Why [`PeriodicRunner::run`](super::PeriodicRunner::run) returned control.
///
/// None of these are errors: guardrail exits ask the process supervisor for a fresh process,
/// a misconfigured task asks it not to respawn in a tight loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerExit {
    /// The configured number of executed cycles was reached.
    RunLimit { runs: u64 },
    /// Resident memory reached the configured limit.
    MemoryLimit { used: u64, limit: u64, runs: u64 },
    /// The task reported a non-positive run interval.
    Misconfigured { interval: i64 },
    /// The cancellation token fired.
    Cancelled,
}

/// `EX_CONFIG` from `sysexits.h`.
const EXIT_CONFIG: i32 = 78;

impl RunnerExit {
    /// Whether a guardrail (run count or memory) ended the loop.
    #[inline]
    pub fn is_guardrail(&self) -> bool {
        matches!(self, RunnerExit::RunLimit { .. } | RunnerExit::MemoryLimit { .. })
    }

    /// Process exit code for a host that terminates after the runner returns.
    #[inline]
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerExit::Misconfigured { .. } => EXIT_CONFIG,
            _ => 0,
        }
    }
}

impl fmt::Display for RunnerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerExit::RunLimit { runs } => write!(f, "run limit reached after {runs} runs"),
            RunnerExit::MemoryLimit { used, limit, runs } => write!(
                f,
                "memory limit reached after {runs} runs ({used} >= {limit} bytes)"
            ),
            RunnerExit::Misconfigured { interval } => {
                write!(f, "misconfigured run interval {interval}")
            }
            RunnerExit::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guardrail_classification() {
        assert!(RunnerExit::RunLimit { runs: 3 }.is_guardrail());
        assert!(
            RunnerExit::MemoryLimit {
                used: 2,
                limit: 1,
                runs: 1
            }
            .is_guardrail()
        );
        assert!(!RunnerExit::Cancelled.is_guardrail());
        assert!(!RunnerExit::Misconfigured { interval: 0 }.is_guardrail());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunnerExit::RunLimit { runs: 1 }.exit_code(), 0);
        assert_eq!(RunnerExit::Cancelled.exit_code(), 0);
        assert_eq!(RunnerExit::Misconfigured { interval: -1 }.exit_code(), 78);
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(
            RunnerExit::RunLimit { runs: 3 }.to_string(),
            "run limit reached after 3 runs"
        );
        assert_eq!(RunnerExit::Cancelled.to_string(), "cancelled");
    }
}
