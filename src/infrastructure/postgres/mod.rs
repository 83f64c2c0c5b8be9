//! PostgreSQL persistence module.
//!
//! Provides connection pooling for the outcome store.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
