//! Durable job outcome storage.
//!
//! - `PostgresOutcomeStore`: `delivery_outcomes` table
//! - `MemoryOutcomeStore`: in-process, for tests
//! - `NoopOutcomeStore`: used when no database is configured

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{NoopOutcomeStore, OutcomeStore, StoreError};
pub use factory::create_outcome_store;
pub use memory_backend::MemoryOutcomeStore;
pub use postgres_backend::PostgresOutcomeStore;
