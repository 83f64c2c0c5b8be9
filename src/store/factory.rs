//! Outcome store factory

use std::sync::Arc;

use crate::postgres::PostgresPool;

use super::backend::{NoopOutcomeStore, OutcomeStore};
use super::postgres_backend::PostgresOutcomeStore;

/// Create the outcome store.
///
/// Nothing is dialed here. With a PostgreSQL pool the `delivery_outcomes`
/// table is created once the readiness gate first reaches the database;
/// without one outcomes are only published to the job source.
pub fn create_outcome_store(postgres_pool: Option<PostgresPool>) -> Arc<dyn OutcomeStore> {
    match postgres_pool {
        Some(pool) => {
            tracing::info!(
                backend = "postgres",
                url = %pool.database_url_masked(),
                "Creating PostgreSQL outcome store"
            );
            Arc::new(PostgresOutcomeStore::new(pool))
        }
        None => {
            tracing::info!(backend = "none", "No database configured, outcomes are not persisted");
            Arc::new(NoopOutcomeStore)
        }
    }
}
