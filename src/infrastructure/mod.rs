//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: Application error type for the observability endpoints
//! - `metrics`: Prometheus metrics helpers
//! - `postgres`: PostgreSQL connection pool
//! - `redis`: Redis connection pool and backoff

pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod redis;
