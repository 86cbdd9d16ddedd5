use std::{future::Future, sync::Arc, time::Duration};

use leasehold_cache::{Cache, Clock};
use leasehold_core::{Jitter, Lease};
use tokio::task::AbortHandle;
use tracing::debug;

use crate::{
    config::RunnerConfig,
    event::{EventKind, Journal, RunnerEvent, Subscribe},
    guard::{MemoryProbe, ProcessMemory, over_limit},
    runner::RunnerExit,
};

/// Lease, sleep, guardrail and event plumbing shared by every runner mode.
pub(super) struct Driver<C: Cache + ?Sized> {
    pub(super) cache: Arc<C>,
    pub(super) config: RunnerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    memory: Arc<dyn MemoryProbe>,
    jitter: Jitter,
    clock: Option<Arc<dyn Clock>>,
}

impl<C: Cache + ?Sized> Driver<C> {
    pub(super) fn new(cache: Arc<C>, config: RunnerConfig) -> Self {
        Self {
            cache,
            config,
            subscribers: vec![Arc::new(Journal::new())],
            memory: Arc::new(ProcessMemory),
            jitter: Jitter::new(),
            clock: None,
        }
    }

    pub(super) fn add_subscriber(&mut self, subscriber: Arc<dyn Subscribe>) {
        debug!(subscriber = subscriber.name(), "runner subscriber attached");
        self.subscribers.push(subscriber);
    }

    pub(super) fn subscriber_names(&self) -> Vec<&'static str> {
        self.subscribers.iter().map(|s| s.name()).collect()
    }

    pub(super) fn set_memory_probe(&mut self, probe: Arc<dyn MemoryProbe>) {
        self.memory = probe;
    }

    pub(super) fn set_jitter(&mut self, jitter: Jitter) {
        self.jitter = jitter;
    }

    pub(super) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = Some(clock);
    }

    /// Announce the runner and build its lease.
    ///
    /// A non-positive interval idles for `misconfigured_idle` and yields the exit instead.
    pub(super) async fn start(&self, key: &str, interval: i64) -> Result<Lease<C>, RunnerExit> {
        self.emit(RunnerEvent::new(EventKind::Started, key).with_interval(interval));

        if interval <= 0 {
            self.emit(RunnerEvent::new(EventKind::Misconfigured, key).with_interval(interval));
            if !self.sleep(self.config.misconfigured_idle).await {
                return Err(self.exit(key, RunnerExit::Cancelled));
            }
            return Err(RunnerExit::Misconfigured { interval });
        }

        let mut lease = Lease::new(Arc::clone(&self.cache), key, interval as u64);
        if let Some(clock) = &self.clock {
            lease = lease.with_clock(Arc::clone(clock));
        }
        Ok(lease)
    }

    /// One acquire attempt. Backend errors count as a busy lease.
    pub(super) async fn acquire(&self, lease: &Lease<C>, key: &str) -> bool {
        match lease.acquire().await {
            Ok(true) => {
                self.emit(RunnerEvent::new(EventKind::LeaseAcquired, key));
                true
            }
            Ok(false) => {
                self.emit(RunnerEvent::new(EventKind::LeaseBusy, key));
                false
            }
            Err(e) => {
                self.emit(RunnerEvent::new(EventKind::LeaseError, key).with_reason(e.to_string()));
                false
            }
        }
    }

    pub(super) async fn release(&self, lease: &Lease<C>, key: &str) {
        match lease.release().await {
            Ok(_) => self.emit(RunnerEvent::new(EventKind::LeaseReleased, key)),
            Err(e) => self.emit(
                RunnerEvent::new(EventKind::ReleaseFailed, key).with_reason(e.to_string()),
            ),
        }
    }

    /// Jittered sleep. Returns `false` if cancelled first.
    pub(super) async fn backoff(&self, key: &str, interval: i64, reason: Option<String>) -> bool {
        let delay = self.jitter.sleep_time(interval);

        let mut event = RunnerEvent::new(EventKind::BackoffScheduled, key)
            .with_delay_ms(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        self.emit(event);

        self.sleep(delay).await
    }

    /// Returns `false` if cancelled first.
    pub(super) async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.config.cancel.cancelled() => false,
        }
    }

    pub(super) fn guardrail(&self, runs: u64) -> Option<RunnerExit> {
        if let Some(limit) = self.config.memory_limit_bytes {
            let used = self.memory.resident_bytes();
            if over_limit(used, Some(limit)) {
                return Some(RunnerExit::MemoryLimit {
                    used: used.unwrap_or(0),
                    limit,
                    runs,
                });
            }
        }
        match self.config.run_limit {
            Some(limit) if runs >= limit => Some(RunnerExit::RunLimit { runs }),
            _ => None,
        }
    }

    pub(super) fn exit_after(&self, key: &str, exit: RunnerExit, runs: u64) -> RunnerExit {
        let event = match exit {
            RunnerExit::RunLimit { runs } => {
                RunnerEvent::new(EventKind::RunLimitReached, key).with_runs(runs)
            }
            RunnerExit::MemoryLimit { used, runs, .. } => {
                RunnerEvent::new(EventKind::MemoryLimitReached, key)
                    .with_runs(runs)
                    .with_memory(used)
            }
            RunnerExit::Misconfigured { interval } => {
                RunnerEvent::new(EventKind::Misconfigured, key).with_interval(interval)
            }
            RunnerExit::Cancelled => RunnerEvent::new(EventKind::Cancelled, key).with_runs(runs),
        };
        self.emit(event);
        exit
    }

    fn exit(&self, key: &str, exit: RunnerExit) -> RunnerExit {
        self.exit_after(key, exit, 0)
    }

    pub(super) fn emit(&self, event: RunnerEvent) {
        for s in &self.subscribers {
            s.on_event(&event);
        }
    }
}

/// Aborts the spawned task body when the awaiting runner future is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run a task body on its own tokio task so a panic is reported like an error.
///
/// Errors carry their full context chain.
pub(super) async fn guarded<R, F>(body: F) -> Result<R, String>
where
    R: Send + 'static,
    F: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let handle = tokio::spawn(body);
    let _abort = AbortOnDrop(handle.abort_handle());

    match handle.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(join) if join.is_panic() => Err(panic_message(join.into_panic())),
        Err(join) => Err(join.to_string()),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}
