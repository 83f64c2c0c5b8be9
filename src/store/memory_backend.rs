//! In-memory outcome store.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::notification::JobOutcome;

use super::backend::{OutcomeStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryOutcomeStore {
    outcomes: DashMap<String, JobOutcome>,
}

impl MemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<JobOutcome> {
        self.outcomes.get(job_id).map(|o| o.value().clone())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[async_trait]
impl OutcomeStore for MemoryOutcomeStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn record(&self, outcome: &JobOutcome) -> Result<(), StoreError> {
        self.outcomes
            .insert(outcome.job_id.clone(), outcome.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{DeliveryJob, JobStatus};

    #[tokio::test]
    async fn test_record_keeps_latest() {
        let store = MemoryOutcomeStore::new();
        let job = DeliveryJob::from_json(
            r#"{"jobId": "job-1", "platformId": "acme", "templateId": "welcome"}"#,
        )
        .unwrap();

        store.record(&JobOutcome::rejected(&job, "first")).await.unwrap();
        store.record(&JobOutcome::delivered(&job, 2, vec![])).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("job-1").unwrap().status, JobStatus::Completed);
        assert!(store.get("job-2").is_none());
    }
}
