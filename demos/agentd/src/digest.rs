use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use leasehold_cache::Cache;
use leasehold_core::RateLimiter;
use leasehold_runner::{CronTask, Outcome};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Notifications allowed per window before the digest goes quiet.
pub const MAX_NOTIFICATIONS: u64 = 3;
/// Length of the notification window in seconds.
pub const NOTIFY_WINDOW: u64 = 300;

const NOTIFY_KEY: &str = "digest-task:notify";

/// Periodic digest builder shared by every `agentd` instance.
///
/// Each cycle assembles a digest; sending it is rate limited cluster-wide, and a locked-out
/// cycle asks the runner to back off while holding the lease.
pub struct DigestTask<C: Cache + ?Sized> {
    interval: i64,
    limiter: RateLimiter<C>,
    built: AtomicU64,
}

impl<C: Cache + ?Sized> DigestTask<C> {
    pub fn new(cache: Arc<C>, interval: i64) -> Self {
        Self {
            interval,
            limiter: RateLimiter::new(cache),
            built: AtomicU64::new(0),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter<C>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn built(&self) -> u64 {
        self.built.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<C: Cache + ?Sized> CronTask for DigestTask<C> {
    fn run_interval(&self) -> i64 {
        self.interval
    }

    fn task_key(&self) -> String {
        "digest-task".to_string()
    }

    async fn execute(&self, cancel: CancellationToken) -> anyhow::Result<Outcome> {
        if cancel.is_cancelled() {
            return Ok(Outcome::Done);
        }

        let seq = self.built.fetch_add(1, Ordering::Relaxed) + 1;

        if !self
            .limiter
            .attempt(NOTIFY_KEY, MAX_NOTIFICATIONS, NOTIFY_WINDOW)
            .await?
        {
            let wait = self.limiter.available_in(NOTIFY_KEY).await?;
            info!(seq, wait_s = wait, "digest built; notifications paused");
            return Ok(Outcome::Delay);
        }

        let left = self.limiter.retries_left(NOTIFY_KEY, MAX_NOTIFICATIONS).await?;
        info!(seq, notifications_left = left, "digest sent");
        Ok(Outcome::Done)
    }
}
