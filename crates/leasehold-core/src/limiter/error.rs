use leasehold_cache::CacheError;
use thiserror::Error;

/// Failure of the limiter itself, as opposed to a key being rate limited.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("rate limiter backend error: {0}")]
    Backend(#[from] CacheError),
    #[error("corrupt rate limiter value under '{key}': {value:?}")]
    Corrupt { key: String, value: String },
}
