//! Single-owner periodic task execution across processes.
//!
//! A [`PeriodicRunner`] repeatedly competes for the lease named after its [`CronTask`], runs the
//! task once whenever it wins, and exits cleanly when a guardrail trips so an external process
//! supervisor can respawn it. A [`ParallelRunner`] holds the lease only while a
//! [`ParallelTask`] claims work and handles the claimed work after releasing it.

pub mod config;
pub use config::{ConfigError, MemorySize, RunnerConfig};

pub mod event;
pub use event::{EventKind, Journal, RunnerEvent, Subscribe};

pub mod guard;
pub use guard::{MemoryProbe, ProcessMemory};

mod runner;
pub use runner::{ParallelRunner, PeriodicRunner, RunnerExit};

mod task;
pub use task::{CronTask, Outcome, ParallelTask, kebab_case, task_key_for};

pub mod prelude {
    pub use crate::{
        CronTask, Outcome, ParallelRunner, ParallelTask, PeriodicRunner, RunnerConfig, RunnerExit,
    };
    pub use leasehold_cache::{Cache, MemoryCache};
    pub use tokio_util::sync::CancellationToken;
}
