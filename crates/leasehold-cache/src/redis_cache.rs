use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, ErrorKind, RedisError, aio::ConnectionManager};
use tracing::{debug, instrument};

use crate::{Cache, CacheError, check_ttl};

/// Redis-backed cache.
///
/// Conditional writes use `SET key value NX PX <ms>`, which Redis executes atomically;
/// counters use `INCR`, which keeps an existing expiry.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    #[instrument(level = "debug", skip(url))]
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        debug!("redis connection established");
        Ok(Self { conn })
    }

    /// Wrap an existing managed connection.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl From<RedisError> for CacheError {
    fn from(e: RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

/// Increment, then give the key `ARGV[1]` ms to live if it has no expiry.
const INCREMENT_WITHIN: &str = r"
local n = redis.call('INCR', KEYS[1])
if redis.call('PTTL', KEYS[1]) < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return n
";

/// TTL in whole milliseconds (at least 1) within the range Redis accepts for `PX`.
#[inline]
fn ttl_ms(key: &str, ttl: Duration) -> Result<i64, CacheError> {
    check_ttl(key, ttl)?;
    i64::try_from(ttl.as_millis())
        .map(|ms| ms.max(1))
        .map_err(|_| CacheError::InvalidTtl {
            key: key.to_string(),
        })
}

/// `INCR` on a non-numeric or overflowing value answers with an error reply.
fn counter_error(key: &str, e: RedisError) -> CacheError {
    match e.kind() {
        ErrorKind::ResponseError | ErrorKind::TypeError => CacheError::NotAnInteger {
            key: key.to_string(),
        },
        _ if e.code() == Some("WRONGTYPE") => CacheError::NotAnInteger {
            key: key.to_string(),
        },
        _ => CacheError::from(e),
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ms = ttl_ms(key, ttl)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let ms = ttl_ms(key, ttl)?;
        let mut conn = self.conn.clone();
        // Nil reply when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let result: Result<i64, RedisError> =
            redis::cmd("INCR").arg(key).query_async(&mut conn).await;

        result.map_err(|e| counter_error(key, e))
    }

    async fn increment_within(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let ms = ttl_ms(key, ttl)?;
        let mut conn = self.conn.clone();
        let result: Result<i64, RedisError> = redis::cmd("EVAL")
            .arg(INCREMENT_WITHIN)
            .arg(1)
            .arg(key)
            .arg(ms)
            .query_async(&mut conn)
            .await;

        result.map_err(|e| counter_error(key, e))
    }
}
