mod journal;
pub use journal::{Journal, Subscribe};

mod view;
pub use view::{View, log_event, message_for};

/// What happened inside a runner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Misconfigured,
    LeaseAcquired,
    LeaseBusy,
    LeaseError,
    WorkClaimed,
    NoWork,
    TaskCompleted,
    TaskDelayed,
    TaskFailed,
    BackoffScheduled,
    LeaseReleased,
    ReleaseFailed,
    RunLimitReached,
    MemoryLimitReached,
    Cancelled,
}

/// One runner lifecycle event, delivered to every [`Subscribe`]r.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerEvent {
    pub kind: EventKind,
    pub task: String,
    pub interval: Option<i64>,
    pub runs: Option<u64>,
    pub delay_ms: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub reason: Option<String>,
}

impl RunnerEvent {
    pub fn new(kind: EventKind, task: impl Into<String>) -> Self {
        Self {
            kind,
            task: task.into(),
            interval: None,
            runs: None,
            delay_ms: None,
            memory_bytes: None,
            reason: None,
        }
    }

    pub fn with_interval(mut self, interval: i64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_runs(mut self, runs: u64) -> Self {
        self.runs = Some(runs);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
