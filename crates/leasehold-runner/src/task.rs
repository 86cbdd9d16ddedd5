use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Result of one successful execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Work was done; the lease is released right away.
    #[default]
    Done,
    /// Nothing to do (or the task asks to slow down); back off before releasing the lease.
    Delay,
}

/// A unit of periodic work coordinated through a lease.
#[async_trait]
pub trait CronTask: Send + Sync + 'static {
    /// Run interval in seconds.
    ///
    /// Used both as the lease TTL and as the upper bound of the jittered backoff, so it should
    /// cover the worst-case duration of [`CronTask::execute`]. Non-positive values disable the
    /// task for the lifetime of the process.
    fn run_interval(&self) -> i64;

    /// Stable lease name for this task.
    ///
    /// Defaults to the type name in hyphenated lowercase (`SyncOrdersTask` → `sync-orders-task`).
    fn task_key(&self) -> String {
        task_key_for::<Self>()
    }

    /// Execute the task once while holding the lease.
    ///
    /// `cancel` fires when the hosting runner is asked to stop; long tasks should observe it.
    async fn execute(&self, cancel: CancellationToken) -> anyhow::Result<Outcome>;
}

/// Work that is claimed under a lease and then handled without it.
///
/// Only [`ParallelTask::claim`] runs while the lease is held, so claiming stays serialised
/// across processes while the claimed work is handled concurrently.
#[async_trait]
pub trait ParallelTask: Send + Sync + 'static {
    /// One claimed unit of work.
    type Work: Send + 'static;

    /// Lease TTL and upper bound of the backoff when nothing is claimable, in seconds.
    /// Non-positive values disable the task for the lifetime of the process.
    fn run_interval(&self) -> i64;

    /// Stable lease name; defaults like [`CronTask::task_key`].
    fn task_key(&self) -> String {
        task_key_for::<Self>()
    }

    /// Take the next unit of work, or `None` when there is nothing to do.
    ///
    /// Must mark the work as taken before returning: the lease is released right after.
    async fn claim(&self, cancel: CancellationToken) -> anyhow::Result<Option<Self::Work>>;

    /// Process a claimed unit. Runs after the lease has been released.
    async fn handle(&self, work: Self::Work, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Default task key for `T`.
pub fn task_key_for<T: ?Sized>() -> String {
    kebab_case(short_type_name(std::any::type_name::<T>()))
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// `SyncOrdersTask` → `sync-orders-task`; every upper-case letter after the first character
/// starts a new segment and underscores become hyphens.
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);

    for (i, ch) in name.chars().enumerate() {
        if ch == '_' || ch == '-' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if ch.is_uppercase() && i > 0 && !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SyncOrdersTask;

    #[async_trait]
    impl CronTask for SyncOrdersTask {
        fn run_interval(&self) -> i64 {
            10
        }
        async fn execute(&self, _cancel: CancellationToken) -> anyhow::Result<Outcome> {
            Ok(Outcome::Done)
        }
    }

    struct Custom;

    #[async_trait]
    impl CronTask for Custom {
        fn run_interval(&self) -> i64 {
            10
        }
        fn task_key(&self) -> String {
            "billing:nightly".into()
        }
        async fn execute(&self, _cancel: CancellationToken) -> anyhow::Result<Outcome> {
            Ok(Outcome::Delay)
        }
    }

    #[test]
    fn default_key_is_kebab_case_type_name() {
        assert_eq!(SyncOrdersTask.task_key(), "sync-orders-task");
        assert_eq!(task_key_for::<SyncOrdersTask>(), "sync-orders-task");
    }

    struct DrainQueue;

    #[async_trait]
    impl ParallelTask for DrainQueue {
        type Work = u32;

        fn run_interval(&self) -> i64 {
            5
        }
        async fn claim(&self, _cancel: CancellationToken) -> anyhow::Result<Option<u32>> {
            Ok(Some(7))
        }
        async fn handle(&self, work: u32, _cancel: CancellationToken) -> anyhow::Result<()> {
            anyhow::ensure!(work == 7, "unexpected work item {work}");
            Ok(())
        }
    }

    #[tokio::test]
    async fn parallel_task_uses_the_same_key_rules() {
        assert_eq!(ParallelTask::task_key(&DrainQueue), "drain-queue");

        let work = DrainQueue.claim(CancellationToken::new()).await.unwrap();
        assert_eq!(work, Some(7));
        DrainQueue.handle(7, CancellationToken::new()).await.unwrap();
    }

    #[test]
    fn key_can_be_overridden() {
        assert_eq!(Custom.task_key(), "billing:nightly");
    }

    #[test]
    fn kebab_case_conversions() {
        assert_eq!(kebab_case("Reaper"), "reaper");
        assert_eq!(kebab_case("PurgeStaleSessions"), "purge-stale-sessions");
        assert_eq!(kebab_case("HTTPPoller"), "h-t-t-p-poller");
        assert_eq!(kebab_case("snake_case_name"), "snake-case-name");
        assert_eq!(kebab_case("Mixed_Case"), "mixed-case");
    }

    #[test]
    fn short_name_strips_path_and_generics() {
        assert_eq!(short_type_name("a::b::Worker<a::c::Thing>"), "Worker");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[tokio::test]
    async fn outcome_defaults_to_done() {
        assert_eq!(Outcome::default(), Outcome::Done);
        let out = Custom.execute(CancellationToken::new()).await.unwrap();
        assert_eq!(out, Outcome::Delay);
    }
}
