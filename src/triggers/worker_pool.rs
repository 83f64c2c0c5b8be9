//! Bounded job worker pool

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Limits how many jobs run at once. One permit per running job.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free worker. Fails once the pool is drained.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore.clone().acquire_owned().await
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently running
    pub fn in_flight(&self) -> usize {
        if self.semaphore.is_closed() {
            return 0;
        }
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn is_drained(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Stop handing out workers and wait up to `grace` for running jobs.
    ///
    /// Returns whether every running job finished in time. The pool is closed
    /// either way.
    pub async fn drain(&self, grace: Duration) -> bool {
        if self.semaphore.is_closed() {
            return true;
        }

        let running = self.in_flight();
        let drained = match tokio::time::timeout(
            grace,
            self.semaphore.acquire_many(self.capacity as u32),
        )
        .await
        {
            Ok(Ok(permits)) => {
                permits.forget();
                true
            }
            Ok(Err(_)) => true,
            Err(_) => false,
        };
        self.semaphore.close();

        if drained {
            tracing::info!(jobs = running, "Worker pool drained");
        } else {
            tracing::warn!(
                remaining = self.capacity.saturating_sub(self.semaphore.available_permits()),
                grace_ms = grace.as_millis() as u64,
                "Worker pool drain timed out, abandoning running jobs"
            );
        }
        drained
    }
}
