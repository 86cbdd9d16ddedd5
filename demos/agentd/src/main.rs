mod digest;
mod settings;

use std::sync::Arc;

use leasehold_cache::{Cache, MemoryCache};
use leasehold_observe::logger_init;
use leasehold_runner::{PeriodicRunner, RunnerConfig, RunnerExit};
use tracing::info;

use crate::{digest::DigestTask, settings::Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    logger_init(&settings.logger)?;
    info!(
        interval = settings.interval,
        run_limit = ?settings.runner.run_limit,
        memory_limit = ?settings.runner.memory_limit_bytes,
        "agentd starting"
    );

    let cancel = settings.runner.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current step");
            cancel.cancel();
        }
    });

    let exit = match settings.redis_url.as_deref() {
        Some(url) => run_shared(url, settings.interval, settings.runner).await?,
        None => run_on(Arc::new(MemoryCache::new()), settings.interval, settings.runner).await,
    };

    info!(%exit, code = exit.exit_code(), "agentd finished");
    std::process::exit(exit.exit_code());
}

async fn run_on<C: Cache>(cache: Arc<C>, interval: i64, config: RunnerConfig) -> RunnerExit {
    let task = Arc::new(DigestTask::new(Arc::clone(&cache), interval));
    PeriodicRunner::new(task, cache, config).run().await
}

#[cfg(feature = "redis")]
async fn run_shared(url: &str, interval: i64, config: RunnerConfig) -> anyhow::Result<RunnerExit> {
    let cache = leasehold_cache::RedisCache::connect(url).await?;
    Ok(run_on(Arc::new(cache), interval, config).await)
}

#[cfg(not(feature = "redis"))]
async fn run_shared(url: &str, interval: i64, config: RunnerConfig) -> anyhow::Result<RunnerExit> {
    tracing::warn!(url, "built without the 'redis' feature; falling back to a process-local cache");
    Ok(run_on(Arc::new(MemoryCache::new()), interval, config).await)
}
