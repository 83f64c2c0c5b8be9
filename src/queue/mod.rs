//! Job sources.
//!
//! The dispatcher consumes [`DeliveryJob`](crate::notification::DeliveryJob)s
//! from a [`JobSource`]:
//!
//! - `RedisJobSource`: reliable list consumption (`BLMOVE` into a processing list)
//! - `MemoryJobSource`: tokio channel, for tests and local runs
//!
//! Use `create_job_source()` to pick one from configuration.

mod backend;
mod factory;
mod memory_backend;
mod redis_backend;

pub use backend::{JobPayload, JobSource, JobSourceError, QueuedJob};
pub use factory::create_job_source;
pub use memory_backend::MemoryJobSource;
pub use redis_backend::RedisJobSource;
