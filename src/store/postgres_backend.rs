//! PostgreSQL outcome store.
//!
//! Outcomes land in `delivery_outcomes`, one row per job id, with the
//! per-recipient failures kept as JSONB. The table is created on the first
//! successful ping or record, so the store can be built before the database
//! is reachable.

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::OnceCell;

use crate::notification::JobOutcome;
use crate::postgres::PostgresPool;

use super::backend::{OutcomeStore, StoreError};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS delivery_outcomes (
        job_id TEXT PRIMARY KEY,
        platform_id TEXT NOT NULL,
        template_id TEXT NOT NULL,
        status TEXT NOT NULL,
        sent_count INTEGER NOT NULL,
        failed_count INTEGER NOT NULL,
        failures JSONB NOT NULL,
        error TEXT,
        finished_at TIMESTAMPTZ NOT NULL
    )
"#;

const UPSERT_OUTCOME: &str = r#"
    INSERT INTO delivery_outcomes
        (job_id, platform_id, template_id, status, sent_count, failed_count, failures, error, finished_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (job_id) DO UPDATE SET
        platform_id = EXCLUDED.platform_id,
        template_id = EXCLUDED.template_id,
        status = EXCLUDED.status,
        sent_count = EXCLUDED.sent_count,
        failed_count = EXCLUDED.failed_count,
        failures = EXCLUDED.failures,
        error = EXCLUDED.error,
        finished_at = EXCLUDED.finished_at
"#;

pub struct PostgresOutcomeStore {
    /// PostgreSQL connection pool
    pool: PostgresPool,

    /// Set once `delivery_outcomes` is known to exist
    schema: OnceCell<()>,
}

impl PostgresOutcomeStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    fn pg(&self) -> &PgPool {
        self.pool.pool()
    }

    /// Create the outcome table if it does not exist yet. Retried until it succeeds once.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(CREATE_TABLE).execute(self.pg()).await?;
                tracing::info!("Outcome store schema ready");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OutcomeStore for PostgresOutcomeStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn record(&self, outcome: &JobOutcome) -> Result<(), StoreError> {
        self.ensure_schema().await?;
        let failures = serde_json::to_value(&outcome.failures)?;

        sqlx::query(UPSERT_OUTCOME)
            .bind(&outcome.job_id)
            .bind(&outcome.platform_id)
            .bind(&outcome.template_id)
            .bind(outcome.status.as_str())
            .bind(outcome.sent_count as i32)
            .bind(outcome.failed_count as i32)
            .bind(&failures)
            .bind(outcome.error.as_deref())
            .bind(outcome.finished_at)
            .execute(self.pg())
            .await?;

        tracing::trace!(
            job_id = %outcome.job_id,
            status = outcome.status.as_str(),
            "Outcome recorded to PostgreSQL"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.pool.ping().await?;
        self.ensure_schema().await
    }

    async fn close(&self) {
        if !self.pg().is_closed() {
            self.pool.close().await;
        }
    }
}
