//! Lease-coordinated periodic execution.
//!
//! Every process hosting the same [`CronTask`] runs its own [`PeriodicRunner`]; the shared
//! cache lease decides which one executes a given cycle:
//!
//! ```text
//!   AcquiringLease ──busy/error──▶ Backoff ──▶ AcquiringLease
//!        │ acquired
//!        ▼
//!     Running ──(delay | failure + exception_sleep)──▶ jittered sleep
//!        │ release lease
//!        ▼
//!   GuardrailCheck ──limit hit──▶ exit ; otherwise ──▶ AcquiringLease
//! ```
//!
//! The lease is released right after each cycle, so the jittered sleep throttles the cycle
//! rate while the lease TTL only bounds how long a crashed holder blocks the others.
//!
//! [`ParallelRunner`] uses the same lease only to serialise claiming work; the claimed work
//! runs after the lease is released, concurrently with other processes.
mod driver;
mod exit;
mod parallel;

pub use exit::RunnerExit;
pub use parallel::ParallelRunner;

use std::sync::Arc;

use leasehold_cache::{Cache, Clock};
use leasehold_core::Jitter;
use tracing::instrument;

use crate::{
    config::RunnerConfig,
    event::{EventKind, RunnerEvent, Subscribe},
    guard::MemoryProbe,
    task::{CronTask, Outcome},
};

use driver::{Driver, guarded};

enum State {
    AcquiringLease,
    Backoff,
    Running,
    GuardrailCheck,
    Exit(RunnerExit),
}

pub struct PeriodicRunner<T: CronTask, C: Cache + ?Sized> {
    task: Arc<T>,
    driver: Driver<C>,
}

impl<T: CronTask, C: Cache + ?Sized> PeriodicRunner<T, C> {
    /// Runner logging through [`Journal`](crate::Journal) and probing the real process memory.
    pub fn new(task: Arc<T>, cache: Arc<C>, config: RunnerConfig) -> Self {
        Self {
            task,
            driver: Driver::new(cache, config),
        }
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.driver.add_subscriber(subscriber);
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.driver.set_memory_probe(probe);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.driver.set_jitter(jitter);
        self
    }

    /// Clock used for the timestamps inside lease markers.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.driver.set_clock(clock);
        self
    }

    /// Names of the attached subscribers, in delivery order.
    pub fn subscribers(&self) -> Vec<&'static str> {
        self.driver.subscriber_names()
    }

    /// Drive the loop until a guardrail trips, the task turns out misconfigured, or the
    /// cancellation token fires.
    ///
    /// Dropping the returned future aborts a task body that is still running; a lease held
    /// at that point is not released and expires with its TTL.
    #[instrument(level = "debug", skip(self), fields(task = %self.task.task_key()))]
    pub async fn run(self) -> RunnerExit {
        let key = self.task.task_key();
        let interval = self.task.run_interval();
        let driver = &self.driver;

        let lease = match driver.start(&key, interval).await {
            Ok(lease) => lease,
            Err(exit) => return exit,
        };

        let mut runs: u64 = 0;
        let mut state = State::AcquiringLease;

        loop {
            state = match state {
                State::AcquiringLease => {
                    if driver.config.cancel.is_cancelled() {
                        State::Exit(RunnerExit::Cancelled)
                    } else if driver.acquire(&lease, &key).await {
                        State::Running
                    } else {
                        State::Backoff
                    }
                }
                State::Backoff => {
                    if driver.backoff(&key, interval, None).await {
                        State::AcquiringLease
                    } else {
                        State::Exit(RunnerExit::Cancelled)
                    }
                }
                State::Running => {
                    let task = Arc::clone(&self.task);
                    let cancel = driver.config.cancel.child_token();

                    let sleep_before_release =
                        match guarded(async move { task.execute(cancel).await }).await {
                            Ok(Outcome::Done) => {
                                driver.emit(RunnerEvent::new(EventKind::TaskCompleted, &key));
                                None
                            }
                            Ok(Outcome::Delay) => {
                                driver.emit(RunnerEvent::new(EventKind::TaskDelayed, &key));
                                Some("task requested delay".to_string())
                            }
                            Err(reason) => {
                                driver.emit(
                                    RunnerEvent::new(EventKind::TaskFailed, &key)
                                        .with_reason(reason.clone()),
                                );
                                driver.config.exception_sleep.then_some(reason)
                            }
                        };

                    let completed = match sleep_before_release {
                        Some(reason) => driver.backoff(&key, interval, Some(reason)).await,
                        None => true,
                    };
                    driver.release(&lease, &key).await;

                    if completed {
                        State::GuardrailCheck
                    } else {
                        State::Exit(RunnerExit::Cancelled)
                    }
                }
                State::GuardrailCheck => {
                    runs += 1;
                    match driver.guardrail(runs) {
                        Some(exit) => State::Exit(exit),
                        None => State::AcquiringLease,
                    }
                }
                State::Exit(exit) => return driver.exit_after(&key, exit, runs),
            };
        }
    }
}
