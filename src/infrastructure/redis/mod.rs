//! Redis broker connectivity
//!
//! - `pool`: shared and dedicated connections to the job broker
//! - `ExponentialBackoff`: delays for reconnection and readiness polling

mod backoff;
pub mod pool;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use pool::{PoolError, RedisPool};
