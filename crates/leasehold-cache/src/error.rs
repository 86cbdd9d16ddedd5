use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("value under key '{key}' is not an integer or would overflow")]
    NotAnInteger { key: String },
    #[error("ttl for key '{key}' is zero or out of range")]
    InvalidTtl { key: String },
    #[error("failed to encode cache value: {0}")]
    Serialization(String),
}
