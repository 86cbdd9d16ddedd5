use std::borrow::Borrow;

use tracing::{debug, error, info, trace, warn};

use super::{EventKind, RunnerEvent};

pub trait View {
    fn as_task(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn interval(&self) -> i64;
    fn runs(&self) -> u64;
    fn delay_ms(&self) -> u64;
    fn memory_bytes(&self) -> u64;
    fn kind(&self) -> EventKind;
    fn has_reason(&self) -> bool;
}

impl<T> View for T
where
    T: Borrow<RunnerEvent>,
{
    #[inline]
    fn as_task(&self) -> &str {
        &self.borrow().task
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn interval(&self) -> i64 {
        self.borrow().interval.unwrap_or(0)
    }
    #[inline]
    fn runs(&self) -> u64 {
        self.borrow().runs.unwrap_or(0)
    }
    #[inline]
    fn delay_ms(&self) -> u64 {
        self.borrow().delay_ms.unwrap_or(0)
    }
    #[inline]
    fn memory_bytes(&self) -> u64 {
        self.borrow().memory_bytes.unwrap_or(0)
    }
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
    #[inline]
    fn has_reason(&self) -> bool {
        self.borrow().reason.is_some()
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // lifecycle
        EventKind::Started => "runner started",
        EventKind::Misconfigured => "run interval is not positive; idling before exit",
        EventKind::Cancelled => "runner cancelled",

        // lease
        EventKind::LeaseAcquired => "lease acquired",
        EventKind::LeaseBusy => "lease held by another process",
        EventKind::LeaseError => "lease backend error; treating as busy",
        EventKind::LeaseReleased => "lease released",
        EventKind::ReleaseFailed => "lease release failed; key will expire with its ttl",

        // task
        EventKind::WorkClaimed => "work claimed; handling without the lease",
        EventKind::NoWork => "no work to claim",
        EventKind::TaskCompleted => "task completed",
        EventKind::TaskDelayed => "task requested backoff",
        EventKind::TaskFailed => "task failed (non-fatal for the loop)",
        EventKind::BackoffScheduled => "backoff scheduled",

        // guardrails
        EventKind::RunLimitReached => "run limit reached; exiting for respawn",
        EventKind::MemoryLimitReached => "memory limit reached; exiting for respawn",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        // lifecycle
        EventKind::Started => info!(task = e.as_task(), interval = e.interval(), "{msg}"),
        EventKind::Misconfigured => error!(task = e.as_task(), interval = e.interval(), "{msg}"),
        EventKind::Cancelled => info!(task = e.as_task(), runs = e.runs(), "{msg}"),

        // lease
        EventKind::LeaseAcquired => debug!(task = e.as_task(), "{msg}"),
        EventKind::LeaseBusy => debug!(task = e.as_task(), "{msg}"),
        EventKind::LeaseError => {
            warn!(task = e.as_task(), reason = e.as_reason(), "{msg}")
        }
        EventKind::LeaseReleased => trace!(task = e.as_task(), "{msg}"),
        EventKind::ReleaseFailed => {
            warn!(task = e.as_task(), reason = e.as_reason(), "{msg}")
        }

        // task
        EventKind::WorkClaimed => debug!(task = e.as_task(), "{msg}"),
        EventKind::NoWork => debug!(task = e.as_task(), "{msg}"),
        EventKind::TaskCompleted => trace!(task = e.as_task(), "{msg}"),
        EventKind::TaskDelayed => debug!(task = e.as_task(), "{msg}"),
        EventKind::TaskFailed => {
            error!(task = e.as_task(), reason = e.as_reason(), "{msg}")
        }
        EventKind::BackoffScheduled => {
            if e.has_reason() {
                debug!(
                    task = e.as_task(),
                    delay_ms = e.delay_ms(),
                    reason = e.as_reason(),
                    "{msg}",
                );
            } else {
                debug!(task = e.as_task(), delay_ms = e.delay_ms(), "{msg}");
            }
        }

        // guardrails
        EventKind::RunLimitReached => info!(task = e.as_task(), runs = e.runs(), "{msg}"),
        EventKind::MemoryLimitReached => warn!(
            task = e.as_task(),
            runs = e.runs(),
            memory_bytes = e.memory_bytes(),
            "{msg}"
        ),
    }
}
