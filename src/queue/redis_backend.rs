//! Redis list job source.
//!
//! Jobs are moved atomically from `<queue>` to `<queue><processing_suffix>`
//! when taken, and removed from the processing list once their outcome is
//! written to `<outcome_prefix>:<jobId>`. Entries left in a processing list
//! belong to a worker that died mid-job; `recover` moves them back to the
//! consuming end of their queue on startup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::config::RedisConfig;
use crate::metrics::BrokerMetrics;
use crate::notification::JobOutcome;
use crate::redis::{PoolError, RedisPool};

use super::backend::{JobSource, JobSourceError, QueuedJob};

pub struct RedisJobSource {
    /// Redis connection pool
    pool: Arc<RedisPool>,

    queues: Vec<String>,
    processing_suffix: String,
    outcome_prefix: String,
    outcome_ttl_seconds: u64,
    recover_on_start: bool,

    /// Round-robin position over `queues`
    cursor: AtomicUsize,

    /// Connection reserved for blocking moves
    blocking: Mutex<Option<MultiplexedConnection>>,
}

impl RedisJobSource {
    pub fn new(pool: Arc<RedisPool>, config: &RedisConfig) -> Self {
        Self {
            pool,
            queues: config.queues.clone(),
            processing_suffix: config.processing_suffix.clone(),
            outcome_prefix: config.outcome_prefix.clone(),
            outcome_ttl_seconds: config.outcome_ttl_seconds,
            recover_on_start: config.recover_on_start,
            cursor: AtomicUsize::new(0),
            blocking: Mutex::new(None),
        }
    }

    fn processing_key(&self, queue: &str) -> String {
        format!("{}{}", queue, self.processing_suffix)
    }

    fn outcome_key(&self, job_id: &str) -> String {
        format!("{}:{}", self.outcome_prefix, job_id)
    }

    /// Queues in polling order for this call, starting at the cursor
    fn rotation(&self) -> Vec<&str> {
        let len = self.queues.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len.max(1);
        (0..len)
            .map(|i| self.queues[(start + i) % len].as_str())
            .collect()
    }

    /// Non-blocking move of one entry from `queue` to its processing list
    async fn try_move(&self, queue: &str) -> Result<Option<String>, PoolError> {
        let processing = self.processing_key(queue);
        self.pool
            .execute(|mut conn| async move {
                redis::cmd("LMOVE")
                    .arg(queue)
                    .arg(&processing)
                    .arg("RIGHT")
                    .arg("LEFT")
                    .query_async(&mut conn)
                    .await
            })
            .await
    }

    /// Blocking move on the reserved connection
    async fn blocking_move(&self, queue: &str, timeout: Duration) -> Result<Option<String>, PoolError> {
        let mut guard = self.blocking.lock().await;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.pool.dedicated_connection().await?,
        };

        let result: redis::RedisResult<Option<String>> = redis::cmd("BLMOVE")
            .arg(queue)
            .arg(self.processing_key(queue))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await;

        match result {
            Ok(entry) => {
                *guard = Some(conn);
                Ok(entry)
            }
            // the connection is dropped and reopened on the next call
            Err(e) => Err(PoolError::Redis(e)),
        }
    }

    /// Move every entry of `queue`'s processing list back to the queue.
    /// Newest entries go first so the oldest end up next in line.
    async fn requeue_processing(&self, queue: &str) -> Result<usize, PoolError> {
        let processing = self.processing_key(queue);
        let processing = processing.as_str();
        let mut moved = 0;
        loop {
            let entry: Option<String> = self
                .pool
                .execute(|mut conn| async move {
                    redis::cmd("LMOVE")
                        .arg(processing)
                        .arg(queue)
                        .arg("LEFT")
                        .arg("RIGHT")
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            if entry.is_none() {
                return Ok(moved);
            }
            moved += 1;
        }
    }

    fn record_error(operation: &str, error: PoolError) -> JobSourceError {
        BrokerMetrics::record_error(operation);
        tracing::warn!(operation = %operation, error = %error, "Redis job source error");
        JobSourceError::Redis(error)
    }
}

#[async_trait]
impl JobSource for RedisJobSource {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn next_job(&self, timeout: Duration) -> Result<Option<QueuedJob>, JobSourceError> {
        let rotation = self.rotation();
        let Some(&first) = rotation.first() else {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        };

        if rotation.len() > 1 {
            for queue in &rotation {
                let entry = self
                    .try_move(queue)
                    .await
                    .map_err(|e| Self::record_error("lmove", e))?;
                if let Some(raw) = entry {
                    return Ok(Some(QueuedJob::parse(*queue, raw)));
                }
            }
        }

        let entry = self
            .blocking_move(first, timeout)
            .await
            .map_err(|e| Self::record_error("blmove", e))?;

        Ok(entry.map(|raw| QueuedJob::parse(first, raw)))
    }

    async fn complete(&self, job: &QueuedJob, outcome: &JobOutcome) -> Result<(), JobSourceError> {
        let processing = self.processing_key(&job.queue);
        let outcome_key = self.outcome_key(job.job_id());
        let outcome_json = serde_json::to_string(outcome)?;
        let ttl = self.outcome_ttl_seconds;
        let raw = job.raw.as_str();

        self.pool
            .execute(|mut conn| async move {
                redis::pipe()
                    .atomic()
                    .cmd("SET")
                    .arg(&outcome_key)
                    .arg(&outcome_json)
                    .arg("EX")
                    .arg(ttl)
                    .ignore()
                    .cmd("LREM")
                    .arg(&processing)
                    .arg(1)
                    .arg(raw)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
            })
            .await
            .map_err(|e| Self::record_error("complete", e))?;

        tracing::debug!(
            job_id = %job.job_id(),
            queue = %job.queue,
            status = outcome.status.as_str(),
            "Job acknowledged"
        );
        Ok(())
    }

    async fn recover(&self) -> Result<usize, JobSourceError> {
        if !self.recover_on_start {
            return Ok(0);
        }

        let mut total = 0;
        for queue in &self.queues {
            let moved = self
                .requeue_processing(queue)
                .await
                .map_err(|e| Self::record_error("recover", e))?;
            if moved > 0 {
                tracing::info!(queue = %queue, moved = moved, "Requeued unacknowledged jobs");
            }
            total += moved;
        }
        Ok(total)
    }

    async fn ping(&self) -> Result<(), JobSourceError> {
        self.pool
            .ping()
            .await
            .map_err(|e| Self::record_error("ping", e))
    }

    async fn close(&self) {
        self.blocking.lock().await.take();
        self.pool.close().await;
    }
}
