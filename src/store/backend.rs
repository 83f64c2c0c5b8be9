//! Outcome store abstraction.

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::JobOutcome;
use crate::postgres::PostgresPoolError;

/// Errors that can occur during outcome store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("PostgreSQL pool error: {0}")]
    Pool(#[from] PostgresPoolError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable record of finished jobs.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Short backend name used in logs and health output
    fn backend_name(&self) -> &'static str;

    /// Persist the outcome of one job. Recording the same job twice keeps the latest.
    async fn record(&self, outcome: &JobOutcome) -> Result<(), StoreError>;

    /// Check the store connection.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release store connections. Idempotent.
    async fn close(&self);
}

/// Store used when no database is configured
#[derive(Debug, Default)]
pub struct NoopOutcomeStore;

#[async_trait]
impl OutcomeStore for NoopOutcomeStore {
    fn backend_name(&self) -> &'static str {
        "none"
    }

    async fn record(&self, _outcome: &JobOutcome) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}
