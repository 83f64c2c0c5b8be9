use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::metrics::JobMetrics;
use crate::notification::{DeliveryDispatcher, JobOutcome};
use crate::queue::{JobPayload, JobSource, JobSourceError, QueuedJob};
use crate::redis::{BackoffConfig, ExponentialBackoff};
use crate::store::OutcomeStore;

use super::worker_pool::WorkerPool;

/// Pulls jobs from a source and runs each on the worker pool
#[derive(Clone)]
pub struct JobConsumer {
    source: Arc<dyn JobSource>,
    dispatcher: Arc<DeliveryDispatcher>,
    store: Arc<dyn OutcomeStore>,
    workers: Arc<WorkerPool>,
    poll_timeout: Duration,
    backoff: BackoffConfig,
}

impl JobConsumer {
    pub fn new(
        source: Arc<dyn JobSource>,
        dispatcher: Arc<DeliveryDispatcher>,
        store: Arc<dyn OutcomeStore>,
        workers: Arc<WorkerPool>,
    ) -> Self {
        Self {
            source,
            dispatcher,
            store,
            workers,
            poll_timeout: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    /// Consume until shutdown is signalled or the worker pool is drained.
    ///
    /// Jobs already handed to a worker keep running; the loop only stops
    /// taking new ones.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = ExponentialBackoff::with_config(self.backoff.clone());

        tracing::info!(
            backend = self.source.backend_name(),
            workers = self.workers.capacity(),
            "Job consumer started"
        );

        match self.source.recover().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count = count, "Recovered unacknowledged jobs"),
            Err(e) => tracing::warn!(error = %e, "Failed to recover unacknowledged jobs"),
        }

        loop {
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                permit = self.workers.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = shutdown.recv() => break,
                next = self.source.next_job(self.poll_timeout) => next,
            };

            match next {
                Ok(Some(queued)) => {
                    backoff.reset();
                    let consumer = self.clone();
                    tokio::spawn(async move {
                        consumer.handle(queued).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(JobSourceError::Closed) => {
                    tracing::info!("Job source closed");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempt(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to take job, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!("Job consumer stopped");
    }

    /// Process one queued entry and publish its outcome.
    pub async fn handle(&self, queued: QueuedJob) -> JobOutcome {
        JobMetrics::record_received(self.source.backend_name());

        let outcome = match &queued.payload {
            JobPayload::Job(job) => {
                tracing::info!(
                    job_id = %job.job_id,
                    queue = %queued.queue,
                    recipients = job.recipients.len(),
                    "Job received"
                );
                self.dispatcher.process(job).await
            }
            JobPayload::Malformed { job_id, reason } => {
                JobMetrics::record_malformed();
                tracing::warn!(job_id = %job_id, queue = %queued.queue, reason = %reason, "Malformed job rejected");
                JobOutcome::malformed(job_id, reason)
            }
        };

        if let Err(e) = self.store.record(&outcome).await {
            tracing::error!(job_id = %outcome.job_id, error = %e, "Failed to record job outcome");
        }

        if let Err(e) = self.source.complete(&queued, &outcome).await {
            tracing::error!(job_id = %outcome.job_id, error = %e, "Failed to acknowledge job");
        }

        outcome
    }
}
