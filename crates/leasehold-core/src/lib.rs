//! Cache-coordinated primitives: leases and the fixed-window rate limiter.

pub mod delay;
pub use delay::{Delay, available_at, current_time, seconds_until};

mod jitter;
pub use jitter::Jitter;

pub mod lease;
pub use lease::{Lease, LeaseMarker};

pub mod limiter;
pub use limiter::{DEFAULT_DECAY_SECONDS, LimiterError, RateLimiter};

mod system;
pub use system::{host_name, new_holder_id};

pub use leasehold_cache::{Cache, CacheError, Clock, ManualClock, MemoryCache, SystemClock};
