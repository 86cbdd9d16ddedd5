use crate::event::{RunnerEvent, view::log_event};

/// Receiver of runner events.
///
/// Called inline from the runner loop, so implementations must not block.
pub trait Subscribe: Send + Sync + 'static {
    fn on_event(&self, event: &RunnerEvent);

    fn name(&self) -> &'static str;
}

/// Writes every event to `tracing` at a fixed level per kind.
pub struct Journal;

impl Journal {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscribe for Journal {
    fn on_event(&self, event: &RunnerEvent) {
        log_event(event);
    }
    fn name(&self) -> &'static str {
        "journal"
    }
}
