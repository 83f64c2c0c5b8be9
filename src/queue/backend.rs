//! Job source abstraction.
//!
//! A job source hands out queued delivery jobs and takes back their outcome.
//! Backends differ in durability only; consumers treat them alike.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::notification::{DeliveryJob, JobOutcome};
use crate::redis::PoolError;

/// Errors that can occur during job source operations.
#[derive(Debug, Error)]
pub enum JobSourceError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] PoolError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The source has been closed during shutdown
    #[error("Job source is closed")]
    Closed,
}

/// Parsed content of a queue entry
#[derive(Debug, Clone)]
pub enum JobPayload {
    Job(Box<DeliveryJob>),
    /// The entry is not a valid job; it is completed as rejected
    Malformed { job_id: String, reason: String },
}

/// A job taken from a source and not yet completed
#[derive(Debug, Clone)]
pub struct QueuedJob {
    /// Queue the entry was taken from
    pub queue: String,
    /// Entry exactly as stored, needed to acknowledge it
    pub raw: String,
    pub payload: JobPayload,
    pub received_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn parse(queue: impl Into<String>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let payload = match DeliveryJob::from_json(&raw) {
            Ok(job) => JobPayload::Job(Box::new(job)),
            Err(e) => JobPayload::Malformed {
                job_id: salvage_job_id(&raw),
                reason: format!("malformed job: {}", e),
            },
        };

        Self {
            queue: queue.into(),
            raw,
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &str {
        match &self.payload {
            JobPayload::Job(job) => &job.job_id,
            JobPayload::Malformed { job_id, .. } => job_id,
        }
    }
}

/// Keep the caller's job id when the rest of the payload is unusable
fn salvage_job_id(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("jobId").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Contract of the external job broker.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Short backend name used in logs and metrics
    fn backend_name(&self) -> &'static str;

    /// Wait up to `timeout` for the next job. `Ok(None)` means nothing arrived.
    async fn next_job(&self, timeout: Duration) -> Result<Option<QueuedJob>, JobSourceError>;

    /// Acknowledge a job and publish its outcome.
    async fn complete(&self, job: &QueuedJob, outcome: &JobOutcome) -> Result<(), JobSourceError>;

    /// Return entries taken by an earlier run but never acknowledged to their
    /// queues. Only safe before this process starts consuming.
    async fn recover(&self) -> Result<usize, JobSourceError>;

    /// Check the broker connection.
    async fn ping(&self) -> Result<(), JobSourceError>;

    /// Release broker connections. Idempotent.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_job() {
        let queued = QueuedJob::parse(
            "herald:jobs",
            r#"{"jobId": "job-1", "platformId": "acme", "templateId": "welcome"}"#,
        );

        assert_eq!(queued.queue, "herald:jobs");
        assert_eq!(queued.job_id(), "job-1");
        assert!(matches!(queued.payload, JobPayload::Job(_)));
    }

    #[test]
    fn test_parse_malformed_keeps_job_id() {
        let queued = QueuedJob::parse("herald:jobs", r#"{"jobId": "job-2", "recipients": 5}"#);

        assert_eq!(queued.job_id(), "job-2");
        match queued.payload {
            JobPayload::Malformed { reason, .. } => assert!(reason.starts_with("malformed job")),
            other => panic!("expected malformed payload, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage_gets_generated_id() {
        let queued = QueuedJob::parse("herald:jobs", "not json");
        assert!(Uuid::parse_str(queued.job_id()).is_ok());
    }
}
