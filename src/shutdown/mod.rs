//! Graceful shutdown handling for the delivery service.
//!
//! This module provides coordinated shutdown functionality that:
//! 1. Stops the consumer from taking new jobs
//! 2. Waits for running jobs to finish within a grace period
//! 3. Releases listener, broker and store handles

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WorkerConfig;
use crate::server::AppContext;
use crate::triggers::WorkerPool;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for running jobs (default: 30 seconds)
    pub drain_timeout: Duration,
    /// Time to wait for handles to be released (default: 10 seconds)
    pub release_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
            release_timeout: Duration::from_secs(10),
        }
    }
}

impl ShutdownConfig {
    pub fn from_worker_config(config: &WorkerConfig) -> Self {
        Self {
            drain_timeout: config.shutdown_grace(),
            release_timeout: config.release_timeout(),
        }
    }
}

/// Handles graceful shutdown of the delivery service
pub struct GracefulShutdown {
    context: Arc<AppContext>,
    workers: Arc<WorkerPool>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    /// Create a new graceful shutdown handler
    pub fn new(
        context: Arc<AppContext>,
        workers: Arc<WorkerPool>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self::with_config(context, workers, shutdown_tx, ShutdownConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(
        context: Arc<AppContext>,
        workers: Arc<WorkerPool>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            context,
            workers,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    ///
    /// Returns a ShutdownResult with details about the shutdown process
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(in_flight = self.workers.in_flight())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult {
            jobs_in_flight: self.workers.in_flight(),
            ..ShutdownResult::default()
        };

        // Phase 1: Stop taking jobs
        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Stopping consumer");
        let _ = self.shutdown_tx.send(());

        // Phase 2: Let running jobs finish
        tracing::info!(
            jobs = result.jobs_in_flight,
            grace_ms = self.config.drain_timeout.as_millis() as u64,
            "Phase 2: Draining running jobs"
        );
        result.jobs_drained = self.workers.drain(self.config.drain_timeout).await;

        // Phase 3: Release external handles
        tracing::info!("Phase 3: Releasing listener, broker and store");
        let release = self.context.release(self.config.release_timeout).await;
        result.released = release.released.len();
        result.release_timed_out = release.timed_out;

        result.duration = start.elapsed();
        result.success = result.jobs_drained && result.release_timed_out.is_empty();

        tracing::info!(
            jobs_drained = result.jobs_drained,
            released = result.released,
            duration_ms = result.duration.as_millis() as u64,
            success = result.success,
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every phase finished within its timeout
    pub success: bool,
    /// Jobs running when shutdown started
    pub jobs_in_flight: usize,
    /// Whether all running jobs finished within the grace period
    pub jobs_drained: bool,
    /// Number of handles released
    pub released: usize,
    /// Handles that did not release in time
    pub release_timed_out: Vec<&'static str>,
    /// Total time taken for shutdown
    pub duration: Duration,
}
