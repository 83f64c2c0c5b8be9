//! Job source factory

use std::sync::Arc;

use crate::config::{RedisConfig, WorkerConfig};
use crate::redis::RedisPool;

use super::backend::JobSource;
use super::memory_backend::MemoryJobSource;
use super::redis_backend::RedisJobSource;

/// Create a job source based on configuration.
///
/// - `"redis"` (default): a `RedisJobSource` if a Redis pool is provided
/// - `"memory"`: a `MemoryJobSource`, jobs only arrive from inside the process
pub fn create_job_source(
    worker: &WorkerConfig,
    redis: &RedisConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn JobSource> {
    match worker.source.as_str() {
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory job source");
            Arc::new(MemoryJobSource::new())
        }
        _ => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    queues = ?redis.queues,
                    "Creating Redis job source"
                );
                Arc::new(RedisJobSource::new(pool, redis))
            } else {
                tracing::warn!("Redis job source requested but no pool provided, falling back to memory");
                Arc::new(MemoryJobSource::new())
            }
        }
    }
}
