//! In-memory job source over a tokio channel.
//!
//! Used for tests and local runs. Jobs are lost on restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::notification::{DeliveryJob, JobOutcome};

use super::backend::{JobSource, JobSourceError, QueuedJob};

const QUEUE_NAME: &str = "memory";

pub struct MemoryJobSource {
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Entries handed out and not yet completed
    processing: Mutex<Vec<String>>,
    /// Published outcomes keyed by job id
    outcomes: DashMap<String, JobOutcome>,
    completed: Notify,
    closed: AtomicBool,
}

impl MemoryJobSource {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            processing: Mutex::new(Vec::new()),
            outcomes: DashMap::new(),
            completed: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a job
    pub fn push(&self, job: &DeliveryJob) -> Result<(), JobSourceError> {
        let raw = serde_json::to_string(job)?;
        self.push_raw(raw)
    }

    /// Enqueue an entry exactly as a producer would have written it
    pub fn push_raw(&self, raw: impl Into<String>) -> Result<(), JobSourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JobSourceError::Closed);
        }
        self.sender
            .send(raw.into())
            .map_err(|_| JobSourceError::Closed)
    }

    pub fn outcome(&self, job_id: &str) -> Option<JobOutcome> {
        self.outcomes.get(job_id).map(|o| o.value().clone())
    }

    pub fn completed_count(&self) -> usize {
        self.outcomes.len()
    }

    /// Wait until the outcome of `job_id` is published or `timeout` passes.
    pub async fn wait_for_outcome(&self, job_id: &str, timeout: Duration) -> Option<JobOutcome> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.completed.notified();
                if let Some(outcome) = self.outcome(job_id) {
                    return outcome;
                }
                notified.await;
            }
        })
        .await
        .ok()
    }
}

impl Default for MemoryJobSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobSource for MemoryJobSource {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn next_job(&self, timeout: Duration) -> Result<Option<QueuedJob>, JobSourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JobSourceError::Closed);
        }

        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(raw)) => {
                self.processing.lock().await.push(raw.clone());
                Ok(Some(QueuedJob::parse(QUEUE_NAME, raw)))
            }
            Ok(None) => Err(JobSourceError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn complete(&self, job: &QueuedJob, outcome: &JobOutcome) -> Result<(), JobSourceError> {
        {
            let mut processing = self.processing.lock().await;
            if let Some(pos) = processing.iter().position(|raw| *raw == job.raw) {
                processing.remove(pos);
            }
        }
        self.outcomes
            .insert(job.job_id().to_string(), outcome.clone());
        self.completed.notify_waiters();

        tracing::debug!(
            job_id = %job.job_id(),
            status = outcome.status.as_str(),
            "Job completed in memory source"
        );
        Ok(())
    }

    async fn recover(&self) -> Result<usize, JobSourceError> {
        let stranded: Vec<String> = self.processing.lock().await.drain(..).collect();
        let count = stranded.len();
        for raw in stranded {
            self.push_raw(raw)?;
        }
        Ok(count)
    }

    async fn ping(&self) -> Result<(), JobSourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JobSourceError::Closed);
        }
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Memory job source closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobPayload;

    fn job(id: &str) -> DeliveryJob {
        DeliveryJob::from_json(&format!(
            r#"{{"jobId": "{}", "platformId": "acme", "templateId": "welcome"}}"#,
            id
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_jobs_come_out_in_order() {
        let source = MemoryJobSource::new();
        source.push(&job("a")).unwrap();
        source.push(&job("b")).unwrap();

        let first = source.next_job(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = source.next_job(Duration::from_millis(10)).await.unwrap().unwrap();

        assert_eq!(first.job_id(), "a");
        assert_eq!(second.job_id(), "b");
        assert!(matches!(first.payload, JobPayload::Job(_)));
    }

    #[tokio::test]
    async fn test_next_job_times_out_empty() {
        let source = MemoryJobSource::new();
        let next = source.next_job(Duration::from_millis(10)).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_complete_publishes_outcome() {
        let source = MemoryJobSource::new();
        source.push(&job("a")).unwrap();

        let queued = source.next_job(Duration::from_millis(10)).await.unwrap().unwrap();
        let JobPayload::Job(parsed) = &queued.payload else {
            panic!("expected a parsed job");
        };
        source
            .complete(&queued, &JobOutcome::delivered(parsed, 1, vec![]))
            .await
            .unwrap();

        let published = source
            .wait_for_outcome("a", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(published.job_id, "a");
        assert_eq!(source.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_recover_returns_unacknowledged_entries() {
        let source = MemoryJobSource::new();
        source.push(&job("a")).unwrap();
        source.push(&job("b")).unwrap();

        let taken = source.next_job(Duration::from_millis(10)).await.unwrap().unwrap();
        let done = source.next_job(Duration::from_millis(10)).await.unwrap().unwrap();
        let JobPayload::Job(parsed) = &done.payload else {
            panic!("expected a parsed job");
        };
        source
            .complete(&done, &JobOutcome::delivered(parsed, 1, vec![]))
            .await
            .unwrap();

        assert_eq!(source.recover().await.unwrap(), 1);
        let again = source.next_job(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again.job_id(), taken.job_id());
        assert_eq!(source.recover().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_source_refuses_work() {
        let source = MemoryJobSource::new();
        source.close().await;
        source.close().await;

        assert!(matches!(source.push(&job("a")), Err(JobSourceError::Closed)));
        assert!(matches!(
            source.next_job(Duration::from_millis(10)).await,
            Err(JobSourceError::Closed)
        ));
        assert!(source.ping().await.is_err());
    }
}
