use std::sync::Arc;

use leasehold_cache::{Cache, Clock};
use leasehold_core::Jitter;
use tracing::instrument;

use crate::{
    config::RunnerConfig,
    event::{EventKind, RunnerEvent, Subscribe},
    guard::MemoryProbe,
    runner::{
        RunnerExit,
        driver::{Driver, guarded},
    },
    task::ParallelTask,
};

enum State<W> {
    AcquiringLease,
    Backoff,
    Claiming,
    Handling(W),
    GuardrailCheck,
    Exit(RunnerExit),
}

/// Runner for [`ParallelTask`]s.
///
/// ```text
///   AcquiringLease ──busy/error──▶ Backoff ──▶ AcquiringLease
///        │ acquired
///        ▼
///     Claiming ──nothing──▶ jittered sleep, release ──▶ GuardrailCheck
///        │ work claimed, release lease
///        ▼
///     Handling ──▶ GuardrailCheck
/// ```
pub struct ParallelRunner<T: ParallelTask, C: Cache + ?Sized> {
    task: Arc<T>,
    driver: Driver<C>,
}

impl<T: ParallelTask, C: Cache + ?Sized> ParallelRunner<T, C> {
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

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.driver.set_clock(clock);
        self
    }

    pub fn subscribers(&self) -> Vec<&'static str> {
        self.driver.subscriber_names()
    }

    /// Claim and handle work until a guardrail trips, the task turns out misconfigured, or the
    /// cancellation token fires.
    ///
    /// Every cycle in which the lease was won counts as a run, whether or not work was
    /// claimed. Dropping the returned future aborts a running `claim` or `handle`.
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
                        State::Claiming
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
                State::Claiming => {
                    let task = Arc::clone(&self.task);
                    let cancel = driver.config.cancel.child_token();

                    match guarded(async move { task.claim(cancel).await }).await {
                        Ok(Some(work)) => {
                            driver.emit(RunnerEvent::new(EventKind::WorkClaimed, &key));
                            driver.release(&lease, &key).await;
                            State::Handling(work)
                        }
                        Ok(None) => {
                            driver.emit(RunnerEvent::new(EventKind::NoWork, &key));
                            let reason = Some("no work to claim".to_string());
                            let completed = driver.backoff(&key, interval, reason).await;
                            driver.release(&lease, &key).await;
                            if completed {
                                State::GuardrailCheck
                            } else {
                                State::Exit(RunnerExit::Cancelled)
                            }
                        }
                        Err(reason) => {
                            driver.emit(
                                RunnerEvent::new(EventKind::TaskFailed, &key)
                                    .with_reason(reason.clone()),
                            );
                            driver.release(&lease, &key).await;
                            self.after_failure(&key, interval, reason).await
                        }
                    }
                }
                State::Handling(work) => {
                    let task = Arc::clone(&self.task);
                    let cancel = driver.config.cancel.child_token();

                    match guarded(async move { task.handle(work, cancel).await }).await {
                        Ok(()) => {
                            driver.emit(RunnerEvent::new(EventKind::TaskCompleted, &key));
                            State::GuardrailCheck
                        }
                        Err(reason) => {
                            driver.emit(
                                RunnerEvent::new(EventKind::TaskFailed, &key)
                                    .with_reason(reason.clone()),
                            );
                            self.after_failure(&key, interval, reason).await
                        }
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

    async fn after_failure(&self, key: &str, interval: i64, reason: String) -> State<T::Work> {
        if !self.driver.config.exception_sleep
            || self.driver.backoff(key, interval, Some(reason)).await
        {
            State::GuardrailCheck
        } else {
            State::Exit(RunnerExit::Cancelled)
        }
    }
}
