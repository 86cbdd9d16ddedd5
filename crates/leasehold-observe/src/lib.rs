//! Process-wide `tracing` setup shared by every leasehold host.
mod logger;
pub use logger::*;
